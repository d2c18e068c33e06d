//! Wire primitives shared by the `mpdrs` control session and audio relay.
//!
//! Control protocol (MPD, line oriented, UTF-8):
//! - the server greets each connection with `OK MPD <version>\n`
//! - commands are single lines terminated by `\n`
//! - replies are zero or more `key: value\n` lines closed by a terminal line
//!   starting with `OK` (success) or `ACK` (error)
//! - `idle` parks the connection until a subsystem changes, then answers with
//!   `changed: <subsystem>` lines; `noidle` cancels a parked `idle`
//!
//! Audio fetch (MPD `httpd` output):
//! - one `GET` request line plus `Accept: */*`
//! - a response head terminated by a blank line
//! - an unbounded binary body

use std::io;

pub const GREETING_PREFIX: &str = "OK MPD ";
pub const IDLE: &str = "idle";
pub const NOIDLE: &str = "noidle";
pub const CHANGED_KEY: &str = "changed";
pub const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Upper bound for an HTTP response head; anything larger is not an audio stream.
pub const MAX_HEAD_LEN: usize = 16 * 1024;

/// Class of a reply's terminal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Ok,
    Ack,
}

impl Completion {
    /// Classify a line by its status-code token.
    ///
    /// The token is the line's first three bytes with whitespace trimmed, so
    /// `OK`, `OK MPD 0.23.5` and `ACK [5@0] {x} ...` all terminate a reply while
    /// `Album: OK Computer` does not.
    pub fn of_line(line: &[u8]) -> Option<Self> {
        let head = &line[..line.len().min(3)];
        match head.trim_ascii() {
            b"OK" => Some(Self::Ok),
            b"ACK" => Some(Self::Ack),
            _ => None,
        }
    }
}

/// One complete control-protocol reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Terminal line, e.g. `OK` or `ACK [50@0] {play} song doesn't exist`.
    pub code: String,
    /// Body lines preceding the terminal line.
    pub lines: Vec<String>,
}

impl Reply {
    pub fn ok(lines: Vec<String>) -> Self {
        Self {
            code: "OK".to_string(),
            lines,
        }
    }

    pub fn completion(&self) -> Completion {
        Completion::of_line(self.code.as_bytes()).unwrap_or(Completion::Ack)
    }

    pub fn is_ok(&self) -> bool {
        self.completion() == Completion::Ok
    }

    /// `key: value` pairs of the body; lines without a separator are skipped.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| split_pair(line))
    }

    /// Subsystems named by `changed:` lines (only present in `idle` replies).
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.pairs()
            .filter(|(key, _)| *key == CHANGED_KEY)
            .map(|(_, value)| value)
    }

    pub fn has_changes(&self) -> bool {
        self.changed().next().is_some()
    }

    /// Encode back into wire form (body lines then terminal line).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in self.lines.iter().chain(std::iter::once(&self.code)) {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out
    }
}

/// Split `key: value` at the first separator; values may contain `": "`.
pub fn split_pair(line: &str) -> Option<(&str, &str)> {
    line.split_once(": ")
}

/// Extract the protocol version from a connection greeting line.
pub fn parse_greeting(line: &str) -> Option<&str> {
    line.trim_end()
        .strip_prefix(GREETING_PREFIX)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Reassembles replies from byte deliveries split at arbitrary points.
///
/// A delivery ending in `\n` only marks a delivery boundary; a reply is
/// complete once its terminal line has arrived in full.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    pending: Vec<u8>,
    lines: Vec<String>,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delivery and return the first reply it completes.
    ///
    /// Bytes past a completed reply stay buffered; push an empty slice to
    /// drain the next one.
    pub fn push(&mut self, bytes: &[u8]) -> Option<Reply> {
        self.pending.extend_from_slice(bytes);
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = &raw[..end];
            let text = String::from_utf8_lossy(line).into_owned();
            if Completion::of_line(line).is_some() {
                return Some(Reply {
                    code: text,
                    lines: std::mem::take(&mut self.lines),
                });
            }
            self.lines.push(text);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.lines.clear();
    }

    /// Take everything buffered past the last completed reply, in wire form.
    pub fn take_remainder(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in self.lines.drain(..) {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out.append(&mut self.pending);
        out
    }
}

/// A song entry from `playlistinfo`, `playlistid`, `find` and friends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Song {
    pub file: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<String>,
    pub pos: Option<u32>,
    pub id: Option<u32>,
}

/// Group a song listing into songs.
///
/// Every `file` key opens a new entry; pairs before the first `file` are
/// ignored, as are tags this crate does not model.
pub fn parse_songs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<Song> {
    let mut songs: Vec<Song> = Vec::new();
    for (key, value) in pairs {
        if key == "file" {
            songs.push(Song {
                file: value.to_string(),
                ..Song::default()
            });
            continue;
        }
        let Some(song) = songs.last_mut() else {
            continue;
        };
        match key {
            "Title" => song.title = Some(value.to_string()),
            "Artist" => song.artist = Some(value.to_string()),
            "Album" => song.album = Some(value.to_string()),
            "Track" => song.track = Some(value.to_string()),
            "Pos" => song.pos = value.parse().ok(),
            "Id" => song.id = value.parse().ok(),
            _ => {}
        }
    }
    songs
}

/// Encode the audio fetch request for `path` (e.g. `/mpd.ogg`).
pub fn encode_fetch_request(path: &str) -> Vec<u8> {
    format!("GET {path} HTTP/1.1\r\nAccept: */*\r\n\r\n").into_bytes()
}

/// Parsed HTTP response head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Offset of the first body byte within the scanned buffer.
    pub body_offset: usize,
}

impl ResponseHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Parse a response head from the start of `buf`.
///
/// Returns `Ok(None)` while the head is still incomplete.
pub fn parse_response_head(buf: &[u8]) -> io::Result<Option<ResponseHead>> {
    let Some(end) = buf
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
    else {
        if buf.len() > MAX_HEAD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "response head too large",
            ));
        }
        return Ok(None);
    };

    let status_line = buf[..end].split(|&b| b == b'\n').next().unwrap_or_default();
    let status = std::str::from_utf8(status_line)
        .ok()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "bad status line {:?}",
                    String::from_utf8_lossy(status_line).trim_end()
                ),
            )
        })?;

    Ok(Some(ResponseHead {
        status,
        body_offset: end + HEAD_TERMINATOR.len(),
    }))
}
