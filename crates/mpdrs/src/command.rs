//! Prompt command grammar.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Empty,
    Quit,
    Help,
    Play,
    Pause,
    Stop,
    Prev,
    Next,
    Clear,
    /// Arguments after `findadd`, passed to the server as typed.
    FindAdd(String),
    /// Arguments after `find`, passed to the server as typed.
    Find(String),
    PlaylistInfo,
    Update,
    Unknown(String),
}

impl UserCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => return Self::Empty,
            "quit" => return Self::Quit,
            "help" => return Self::Help,
            "play" => return Self::Play,
            "pause" => return Self::Pause,
            "stop" => return Self::Stop,
            "prev" => return Self::Prev,
            "next" => return Self::Next,
            "clear" => return Self::Clear,
            "playlistinfo" => return Self::PlaylistInfo,
            "update" => return Self::Update,
            _ => {}
        }
        if let Some(query) = argument(line, "findadd") {
            return Self::FindAdd(query.to_string());
        }
        if let Some(query) = argument(line, "find") {
            return Self::Find(query.to_string());
        }
        Self::Unknown(line.to_string())
    }
}

/// Non-empty arguments following `keyword` and whitespace.
fn argument<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim()).filter(|query| !query.is_empty())
}
