//! Typed helpers for the commands the prompt issues.
//!
//! State-changing helpers mark the session as expecting a change, which arms
//! [`ControlSession::wait`]. `findadd` only does so when the server accepts it.

use mpd_proto::Reply;

use super::{ControlSession, SessionError};

impl ControlSession {
    /// [`ControlSession::send_command`], retried once across a reconnect.
    pub fn request(&mut self, command: &str) -> Result<Reply, SessionError> {
        for _ in 0..2 {
            if let Some(reply) = self.send_command(command)? {
                return Ok(reply);
            }
        }
        Err(SessionError::ConnectionLost {
            addr: self.config.addr.clone(),
        })
    }

    fn mutate(&mut self, command: &str) -> Result<Reply, SessionError> {
        let reply = self.request(command)?;
        self.expecting_change = true;
        Ok(reply)
    }

    pub fn play(&mut self) -> Result<Reply, SessionError> {
        self.mutate("play")
    }

    pub fn pause(&mut self) -> Result<Reply, SessionError> {
        self.mutate("pause 1")
    }

    pub fn stop(&mut self) -> Result<Reply, SessionError> {
        self.mutate("stop")
    }

    pub fn previous(&mut self) -> Result<Reply, SessionError> {
        self.mutate("previous")
    }

    pub fn next(&mut self) -> Result<Reply, SessionError> {
        self.mutate("next")
    }

    pub fn clear(&mut self) -> Result<Reply, SessionError> {
        self.mutate("clear")
    }

    /// Queue every song matching `query`, e.g. `artist "Nina Simone"`.
    pub fn findadd(&mut self, query: &str) -> Result<Reply, SessionError> {
        let reply = self.request(&format!("findadd {query}"))?;
        if reply.is_ok() {
            self.expecting_change = true;
        }
        Ok(reply)
    }

    pub fn find(&mut self, query: &str) -> Result<Reply, SessionError> {
        self.request(&format!("find {query}"))
    }

    pub fn playlist_info(&mut self) -> Result<Reply, SessionError> {
        self.request("playlistinfo")
    }

    /// Start a database rescan; the reply carries the `updating_db` job id.
    pub fn update(&mut self) -> Result<Reply, SessionError> {
        self.request("update")
    }
}
