//! Text rendering for the prompt.

use mpd_proto::Song;

use crate::remote::ServerStatus;

pub const RULE: &str = "~~~~~~~~~~~~~~~~~~~~";

pub const HELP: &str = "\
Commands:
 quit                  quit mpdrs
 help                  display this message
 play                  tell mpd to play; stream the audio; play it locally
 pause                 tell mpd to pause; pause the local player
 stop                  tell mpd to stop; stop streaming; quit the local player
 prev                  tell mpd to play the previous track, resuming the stream
 next                  tell mpd to play the next track, resuming the stream
 clear                 tell mpd to clear the playlist; stop streaming; quit the local player
 findadd <tag> <val>   add every song whose <tag> is <val> to the playlist (case-sensitive, quote multi-word values)
 find <tag> <val>      list every song whose <tag> is <val> (case-sensitive, quote multi-word values)
 playlistinfo          display the current playlist
 update                ask mpd to rescan its music database";

/// Status banner shown before each prompt.
pub fn render_banner(status: &ServerStatus) -> String {
    let mut out = format!("{RULE}\n");
    if let Some(length) = &status.playlist_length {
        out.push_str(&format!(" Playlist length: {length}\n"));
    }
    match &status.song_title {
        Some(title) => {
            out.push_str(" Current song: ");
            if let Some(artist) = status.song_artist.as_deref().filter(|a| !a.is_empty()) {
                out.push_str(&format!("{artist} - "));
            }
            out.push_str(title);
            out.push('\n');
            let state = status
                .play_state()
                .map(|s| s.label())
                .or(status.state.as_deref())
                .unwrap_or("unknown");
            out.push_str(&format!(" [{state}]\n"));
        }
        None => out.push_str(" [stopped]\n"),
    }
    out.push_str(RULE);
    out
}

pub fn render_search_results(songs: &[Song]) -> String {
    if songs.is_empty() {
        return "[no matches]".to_string();
    }
    songs
        .iter()
        .map(|song| {
            format!(
                "{}\t\t{}\t\t{}",
                song.artist.as_deref().unwrap_or("[unknown artist]"),
                song.album.as_deref().unwrap_or("[no album]"),
                title_of(song),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_playlist(songs: &[Song]) -> String {
    if songs.is_empty() {
        return "[playlist empty]".to_string();
    }
    songs
        .iter()
        .map(|song| {
            let track = match (&song.track, song.pos) {
                (Some(track), _) => track.clone(),
                (None, Some(pos)) => (pos + 1).to_string(),
                (None, None) => "-".to_string(),
            };
            format!(
                "{track}\t{}\t\t{}\t\t{}",
                song.artist.as_deref().unwrap_or("[unknown artist]"),
                song.album.as_deref().unwrap_or("[no album]"),
                title_of(song),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn title_of(song: &Song) -> &str {
    song.title.as_deref().unwrap_or(&song.file)
}
