//! Control session with an MPD server.
//!
//! One foreground caller issues commands while the idle listener thread owns
//! the read half of the socket. Between commands the session parks the
//! server in `idle`, so subsystem changes arrive as unsolicited replies that
//! the listener turns into a status-changed signal. [`ControlSession::wait`]
//! consumes that signal to refresh the cached [`ServerStatus`].

mod commands;
mod listener;
mod status;
#[cfg(test)]
pub(crate) mod testing;

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use mpd_proto::{IDLE, NOIDLE, Reply, ReplyAssembler};

use crate::config::RemoteConfig;
use listener::IdleListener;

pub use status::{PlayState, ServerStatus};

const WAIT_POLL: Duration = Duration::from_millis(1);
/// Harmless command sent on quit so a parked server replies and the listener's read returns.
const WAKE_UP_COMMAND: &str = "clearerror";
const MAX_GREETING_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not connect to mpd at {addr}")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection to mpd at {addr} keeps dropping")]
    ConnectionLost { addr: String },
    #[error("{addr} did not greet like an mpd server: {greeting:?}")]
    Handshake { addr: String, greeting: String },
    #[error("control connection error")]
    Io(#[from] io::Error),
}

/// Socket writer plus the idle bookkeeping shared with the listener.
#[derive(Debug, Default)]
pub(crate) struct Link {
    writer: Option<TcpStream>,
    /// An `idle` is outstanding at the server.
    idle: bool,
    /// A `noidle` was sent and its idle reply belongs to the foreground.
    noidle_sent: bool,
    /// The foreground sits in [`ControlSession::wait`]; the listener must not re-arm.
    waiting: bool,
    /// The listener saw the connection drop.
    lost: bool,
}

impl Link {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        tracing::trace!(line, "mpd <-");
        writer.write_all(format!("{line}\n").as_bytes())
    }

    /// Park the server in idle unless it already is.
    fn arm_idle(&mut self) -> io::Result<()> {
        if !self.idle {
            self.send_line(IDLE)?;
            self.idle = true;
        }
        Ok(())
    }
}

pub(crate) fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ControlSession {
    config: RemoteConfig,
    link: Arc<Mutex<Link>>,
    listener: Option<IdleListener>,
    reply_tx: Sender<Vec<u8>>,
    reply_rx: Receiver<Vec<u8>>,
    changed_tx: Sender<()>,
    changed_rx: Receiver<()>,
    assembler: ReplyAssembler,
    status: ServerStatus,
    expecting_change: bool,
    server_version: Option<String>,
}

impl ControlSession {
    pub fn new(config: RemoteConfig) -> Self {
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded();
        let (changed_tx, changed_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            link: Arc::new(Mutex::new(Link::default())),
            listener: None,
            reply_tx,
            reply_rx,
            changed_tx,
            changed_rx,
            assembler: ReplyAssembler::new(),
            status: ServerStatus::default(),
            expecting_change: false,
            server_version: None,
        }
    }

    /// Connect, read the greeting and park the server in idle.
    ///
    /// Does nothing if the session already has a listener.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let addr = self.config.addr.clone();
        tracing::info!(addr = %addr, "connecting to mpd");
        let stream = TcpStream::connect(&addr).map_err(|source| SessionError::ConnectionRefused {
            addr: addr.clone(),
            source,
        })?;
        let _ = stream.set_nodelay(true);
        let mut reader = stream.try_clone()?;
        reader.set_read_timeout(Some(self.config.greeting_timeout))?;
        let greeting = read_greeting(&mut reader)?;
        reader.set_read_timeout(None)?;
        let Some(version) = mpd_proto::parse_greeting(&greeting) else {
            return Err(SessionError::Handshake {
                addr,
                greeting: greeting.trim_end().to_string(),
            });
        };
        tracing::info!(addr = %addr, version, "connected to mpd");
        self.server_version = Some(version.to_string());

        {
            let mut link = lock(&self.link);
            let waiting = link.waiting;
            *link = Link {
                writer: Some(stream),
                waiting,
                ..Link::default()
            };
            link.arm_idle()?;
        }
        self.listener = Some(IdleListener::spawn(
            reader,
            self.link.clone(),
            self.reply_tx.clone(),
            self.changed_tx.clone(),
        ));
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.listener.is_some() && !lock(&self.link).lost
    }

    /// Whether an `idle` is outstanding at the server.
    pub fn is_idle(&self) -> bool {
        lock(&self.link).idle
    }

    pub fn status(&self) -> &ServerStatus {
        &self.status
    }

    pub fn expecting_change(&self) -> bool {
        self.expecting_change
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Run one command and return its reply, `ACK` replies included.
    ///
    /// If the session entered parked in idle it leaves parked in idle, and
    /// vice versa. `Ok(None)` means the connection dropped mid-exchange and
    /// was re-established; the command may or may not have run.
    pub fn send_command(&mut self, command: &str) -> Result<Option<Reply>, SessionError> {
        if self.needs_recovery() {
            self.recover()?;
        }
        match self.exchange(command) {
            Ok(Some(reply)) => Ok(Some(reply)),
            Ok(None) => {
                self.recover()?;
                Ok(None)
            }
            Err(e) => {
                tracing::debug!(command, error = %e, "mpd exchange failed");
                self.recover()?;
                Ok(None)
            }
        }
    }

    fn exchange(&mut self, command: &str) -> io::Result<Option<Reply>> {
        let was_idle = {
            let mut link = lock(&self.link);
            let was_idle = link.idle;
            if was_idle {
                link.noidle_sent = true;
                link.idle = false;
                link.send_line(NOIDLE)?;
            }
            was_idle
        };
        if was_idle && self.read_reply().is_none() {
            return Ok(None);
        }

        tracing::debug!(command, "mpd command");
        lock(&self.link).send_line(command)?;
        let Some(reply) = self.read_reply() else {
            return Ok(None);
        };
        if !reply.is_ok() {
            tracing::debug!(command, code = %reply.code, "mpd rejected command");
        }

        if was_idle {
            lock(&self.link).arm_idle()?;
        }
        Ok(Some(reply))
    }

    /// Next complete reply from the listener; `None` once the connection is gone.
    fn read_reply(&mut self) -> Option<Reply> {
        let mut reply = self.assembler.push(&[]);
        while reply.is_none() {
            let delivery = self.reply_rx.recv().ok()?;
            if delivery.is_empty() {
                return None;
            }
            reply = self.assembler.push(&delivery);
        }
        reply
    }

    fn needs_recovery(&self) -> bool {
        self.listener.is_none() || lock(&self.link).lost
    }

    fn recover(&mut self) -> Result<(), SessionError> {
        tracing::warn!(addr = %self.config.addr, "reconnecting to mpd");
        self.stop_listener(false);
        self.connect()
    }

    /// Stop the listener, close the socket and forget buffered replies.
    fn stop_listener(&mut self, wake_server: bool) {
        if let Some(listener) = self.listener.take() {
            listener.request_stop();
            let writer = {
                let mut link = lock(&self.link);
                if wake_server {
                    if let Err(e) = link.send_line(WAKE_UP_COMMAND) {
                        tracing::debug!(error = %e, "control socket already closed");
                    }
                }
                link.writer.take()
            };
            if let Some(writer) = writer {
                let _ = writer.shutdown(Shutdown::Both);
            }
            listener.join();
        }
        {
            let mut link = lock(&self.link);
            link.writer = None;
            link.idle = false;
            link.noidle_sent = false;
            link.lost = false;
        }
        self.assembler.clear();
        while self.reply_rx.try_recv().is_ok() {}
    }

    /// Re-read `status` and, when a song is current, its metadata.
    ///
    /// The cached status is cleared first and only replaced once the status
    /// reply succeeds, so a failed refresh leaves every field unknown.
    pub fn refresh_status(&mut self) -> Result<&ServerStatus, SessionError> {
        self.status = ServerStatus::default();
        let reply = match self.send_command("status")? {
            Some(reply) if reply.is_ok() => reply,
            Some(reply) => {
                tracing::warn!(code = %reply.code, "failed to fetch status");
                return Ok(&self.status);
            }
            None => {
                tracing::warn!("status refresh interrupted by reconnect");
                return Ok(&self.status);
            }
        };
        let mut status = ServerStatus::from_pairs(reply.pairs());
        if let Some(song_id) = status.current_song_id().map(str::to_owned) {
            match self.send_command(&format!("playlistid {song_id}"))? {
                Some(info) if info.is_ok() => {
                    if let Some(song) = mpd_proto::parse_songs(info.pairs()).first() {
                        status.apply_song(song);
                    }
                }
                Some(info) => tracing::warn!(code = %info.code, "failed to fetch current song"),
                None => tracing::warn!("current song lookup interrupted by reconnect"),
            }
        }
        self.status = status;
        Ok(&self.status)
    }

    /// [`ControlSession::wait_for`] with the configured timeout.
    pub fn wait(&mut self) -> Result<bool, SessionError> {
        self.wait_for(self.config.wait_timeout)
    }

    /// Wait for the server to confirm the last state-changing command.
    ///
    /// Refreshes the status at most once and returns whether it did. Without
    /// an expected change the gate returns at once and discards any signal
    /// the listener already raised.
    pub fn wait_for(&mut self, timeout: Duration) -> Result<bool, SessionError> {
        if self.needs_recovery() {
            self.recover()?;
        }
        lock(&self.link).waiting = true;
        let outcome = self.await_change(timeout);

        let mut link = lock(&self.link);
        link.waiting = false;
        if let Err(e) = link.arm_idle() {
            tracing::warn!(error = %e, "failed to re-arm idle after wait");
            link.lost = true;
        }
        outcome
    }

    fn await_change(&mut self, timeout: Duration) -> Result<bool, SessionError> {
        if !self.expecting_change {
            self.drain_changes();
            return Ok(false);
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.drain_changes() {
                self.expecting_change = false;
                self.refresh_status()?;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::debug!(
                    timeout_ms = timeout.as_millis() as u64,
                    "no change confirmed by mpd"
                );
                self.expecting_change = false;
                return Ok(false);
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    fn drain_changes(&self) -> bool {
        let mut seen = false;
        while self.changed_rx.try_recv().is_ok() {
            seen = true;
        }
        seen
    }

    /// Close the session: wake the parked server, shut the socket down and
    /// join the listener. Safe to call more than once.
    pub fn quit(&mut self) {
        if self.listener.is_none() {
            return;
        }
        self.stop_listener(true);
        tracing::info!(addr = %self.config.addr, "mpd session closed");
    }

    #[cfg(test)]
    pub(crate) fn set_waiting(&self, waiting: bool) {
        lock(&self.link).waiting = waiting;
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.quit();
    }
}

/// Read the greeting line byte by byte so nothing past it is consumed.
///
/// A read timeout ends the line early; the partial text then fails the
/// handshake.
fn read_greeting(stream: &mut TcpStream) -> Result<String, SessionError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while !line.ends_with(b"\n") && line.len() < MAX_GREETING_LEN {
        match stream.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => line.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                tracing::warn!("mpd did not send a greeting in time");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
