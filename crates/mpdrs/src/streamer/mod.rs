//! Audio relay: fetches the server's HTTP stream and feeds the player's pipe.
//!
//! The relay owns its own thread. The foreground sends directives over a
//! channel and blocks until the relay acknowledges that the directive's
//! immediate effect has settled; for `play` that is the moment the startup
//! buffer has been handed to the sink (or the attempt has failed).

mod sink;
mod source;
mod state;
#[cfg(test)]
pub(crate) mod testing;

use std::io;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::config::StreamerConfig;
use sink::PipeSink;
use source::AudioSource;

pub use source::probe;
pub use state::{StreamFlags, StreamPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Play,
    Pause,
    Stop,
    Quit,
}

struct Directive {
    kind: DirectiveKind,
    ack: Sender<StreamFlags>,
}

/// Foreground handle to the relay thread.
pub struct Streamer {
    cmd_tx: Sender<Directive>,
    last: StreamFlags,
    join: Option<JoinHandle<()>>,
}

impl Streamer {
    pub fn spawn(config: StreamerConfig) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let join = std::thread::spawn(move || Relay::new(config, cmd_rx).run());
        Self {
            cmd_tx,
            last: StreamFlags::default(),
            join: Some(join),
        }
    }

    /// Connect if needed and start buffering; returns once audio reaches the
    /// sink or the attempt failed.
    pub fn play(&mut self) -> StreamFlags {
        self.request(DirectiveKind::Play)
    }

    pub fn pause(&mut self) -> StreamFlags {
        self.request(DirectiveKind::Pause)
    }

    pub fn stop(&mut self) -> StreamFlags {
        self.request(DirectiveKind::Stop)
    }

    /// Stop the relay thread and wait for it. Safe to call more than once.
    pub fn quit(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        self.request(DirectiveKind::Quit);
        if join.join().is_err() {
            tracing::warn!("relay thread panicked");
        }
    }

    /// Flags from the most recent acknowledgement.
    pub fn flags(&self) -> StreamFlags {
        self.last
    }

    pub fn is_connected(&self) -> bool {
        self.last.connected
    }

    fn request(&mut self, kind: DirectiveKind) -> StreamFlags {
        let (ack, ack_rx) = crossbeam_channel::bounded(1);
        if self.cmd_tx.send(Directive { kind, ack }).is_err() {
            tracing::warn!(?kind, "relay thread is gone");
            self.last = StreamFlags::default();
            return self.last;
        }
        // A dropped acknowledgement means the relay exited.
        self.last = ack_rx.recv().unwrap_or_default();
        tracing::debug!(?kind, phase = ?self.last.phase(), "relay acknowledged");
        self.last
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.quit();
    }
}

struct Relay {
    config: StreamerConfig,
    cmd_rx: Receiver<Directive>,
    flags: StreamFlags,
    source: Option<AudioSource>,
    /// Payload that arrived with the response head, used by the first `play`.
    captured: Option<Vec<u8>>,
    buffer: Vec<u8>,
    sink: PipeSink,
    /// `play` acknowledgement held back until buffering ends.
    pending_ack: Option<Sender<StreamFlags>>,
    quitting: bool,
    connect_attempts: u64,
}

impl Relay {
    fn new(config: StreamerConfig, cmd_rx: Receiver<Directive>) -> Self {
        let sink = PipeSink::new(config.sink_path.clone());
        Self {
            config,
            cmd_rx,
            flags: StreamFlags::default(),
            source: None,
            captured: None,
            buffer: Vec::new(),
            sink,
            pending_ack: None,
            quitting: false,
            connect_attempts: 0,
        }
    }

    fn run(mut self) {
        tracing::debug!(addr = %self.config.addr, "relay started");
        while self.poll_directive() {
            self.step();
        }
        self.sink.close();
        self.release_pending_ack();
        tracing::debug!("relay exiting");
    }

    /// Dispatch at most one directive; blocks only while disconnected.
    ///
    /// Returns false once the relay should exit.
    fn poll_directive(&mut self) -> bool {
        let directive = if self.flags.connected {
            match self.cmd_rx.try_recv() {
                Ok(directive) => Some(directive),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return false,
            }
        } else {
            match self.cmd_rx.recv() {
                Ok(directive) => Some(directive),
                Err(_) => return false,
            }
        };
        if let Some(directive) = directive {
            self.dispatch(directive);
        }
        !self.quitting
    }

    fn dispatch(&mut self, directive: Directive) {
        let Directive { kind, ack } = directive;
        tracing::debug!(?kind, phase = ?self.flags.phase(), "relay directive");
        self.release_pending_ack();
        match kind {
            DirectiveKind::Play => self.play(ack),
            DirectiveKind::Pause => {
                self.flags.halt();
                self.acknowledge(ack);
            }
            DirectiveKind::Stop => {
                self.flags.halt();
                self.sink.close();
                self.disconnect();
                self.acknowledge(ack);
            }
            DirectiveKind::Quit => {
                self.flags.halt();
                self.sink.close();
                self.quitting = true;
                self.acknowledge(ack);
            }
        }
    }

    fn play(&mut self, ack: Sender<StreamFlags>) {
        if !self.flags.connected {
            if let Err(e) = self.connect() {
                tracing::error!(
                    addr = %self.config.addr,
                    attempt = self.connect_attempts,
                    error = %e,
                    "failed to connect to http stream server"
                );
                return self.acknowledge(ack);
            }
        }
        if self.flags.is_active() {
            return self.acknowledge(ack);
        }
        self.buffer = self.captured.take().unwrap_or_default();
        self.flags.start_buffering();
        tracing::debug!(seeded = self.buffer.len(), "relay buffering");
        self.pending_ack = Some(ack);
        self.check_threshold();
    }

    fn connect(&mut self) -> io::Result<()> {
        self.connect_attempts += 1;
        tracing::info!(
            addr = %self.config.addr,
            attempt = self.connect_attempts,
            "connecting to http stream server"
        );
        let (source, captured) = AudioSource::open(&self.config)?;
        self.source = Some(source);
        self.captured = Some(captured);
        self.flags.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.source.take().is_some() {
            tracing::info!(addr = %self.config.addr, "http stream closed");
        }
        self.captured = None;
        self.buffer.clear();
        self.flags.disconnect();
    }

    fn acknowledge(&self, ack: Sender<StreamFlags>) {
        let _ = ack.send(self.flags);
    }

    fn release_pending_ack(&mut self) {
        if let Some(ack) = self.pending_ack.take() {
            self.acknowledge(ack);
        }
    }

    /// Receive one chunk and route it by phase. Paused or stalled relays
    /// discard what they read so the origin never backs up.
    fn step(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        let chunk = match source.receive() {
            Ok(chunk) => chunk,
            Err(e) => return self.lose_connection(e),
        };
        if self.flags.buffering {
            self.absorb(&chunk);
        } else if self.flags.writing && !chunk.is_empty() {
            self.write_through(&chunk);
        }
    }

    fn lose_connection(&mut self, error: io::Error) {
        tracing::warn!(error = %error, phase = ?self.flags.phase(), "lost http stream connection");
        self.sink.close();
        self.disconnect();
        self.release_pending_ack();
    }

    fn absorb(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.check_threshold();
    }

    /// Leave the buffering phase once the buffer holds enough audio. The
    /// buffer overshoots the threshold by at most one read chunk.
    fn check_threshold(&mut self) {
        if !self.flags.buffering || self.buffer.len() < self.config.flush_threshold() {
            return;
        }
        tracing::debug!(buffered = self.buffer.len(), "buffer threshold reached");
        self.flags.start_writing();
        let buffered = std::mem::take(&mut self.buffer);
        match self.sink.open() {
            Ok(()) => self.write_through(&buffered),
            Err(e) => self.sink_failed(e),
        }
        self.release_pending_ack();
    }

    fn write_through(&mut self, bytes: &[u8]) {
        if let Err(e) = self.sink.write(bytes) {
            self.sink_failed(e);
        }
    }

    fn sink_failed(&mut self, error: io::Error) {
        tracing::warn!(
            path = ?self.config.sink_path,
            error = %error,
            "sink unavailable; draining until the next play"
        );
        self.sink.close();
        self.flags.stall();
    }
}
