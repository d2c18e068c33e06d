//! Server status snapshot.

use mpd_proto::Song;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Play,
    Pause,
    Stop,
}

impl PlayState {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Play => "playing",
            Self::Pause => "paused",
            Self::Stop => "stopped",
        }
    }
}

/// Last known server status. Every field is unknown until a refresh
/// succeeds, and a failed refresh clears them all again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    pub volume: Option<String>,
    pub repeat: Option<String>,
    pub random: Option<String>,
    pub single: Option<String>,
    pub consume: Option<String>,
    pub playlist: Option<String>,
    pub playlist_length: Option<String>,
    pub mixramp_db: Option<String>,
    pub state: Option<String>,
    pub song: Option<String>,
    pub song_id: Option<String>,
    pub next_song: Option<String>,
    pub next_song_id: Option<String>,
    pub time: Option<String>,
    pub elapsed: Option<String>,
    pub duration: Option<String>,
    pub bitrate: Option<String>,
    pub audio: Option<String>,
    pub error: Option<String>,
    pub song_title: Option<String>,
    pub song_artist: Option<String>,
    pub song_album: Option<String>,
}

impl ServerStatus {
    /// Build from the pairs of a `status` reply; unknown keys are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut status = Self::default();
        for (key, value) in pairs {
            let slot = match key {
                "volume" => &mut status.volume,
                "repeat" => &mut status.repeat,
                "random" => &mut status.random,
                "single" => &mut status.single,
                "consume" => &mut status.consume,
                "playlist" => &mut status.playlist,
                "playlistlength" => &mut status.playlist_length,
                "mixrampdb" => &mut status.mixramp_db,
                "state" => &mut status.state,
                "song" => &mut status.song,
                "songid" => &mut status.song_id,
                "nextsong" => &mut status.next_song,
                "nextsongid" => &mut status.next_song_id,
                "time" => &mut status.time,
                "elapsed" => &mut status.elapsed,
                "duration" => &mut status.duration,
                "bitrate" => &mut status.bitrate,
                "audio" => &mut status.audio,
                "error" => &mut status.error,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        status
    }

    pub fn play_state(&self) -> Option<PlayState> {
        self.state.as_deref().and_then(PlayState::parse)
    }

    pub fn playlist_len(&self) -> Option<u32> {
        self.playlist_length.as_deref()?.parse().ok()
    }

    /// Id of the current song, when there is one.
    pub fn current_song_id(&self) -> Option<&str> {
        self.song.as_ref()?;
        self.song_id.as_deref()
    }

    pub(crate) fn apply_song(&mut self, song: &Song) {
        self.song_title = song.title.clone();
        self.song_artist = song.artist.clone();
        self.song_album = song.album.clone();
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}
