//! Idle listener: owns the read half of the control socket.
//!
//! While the server is parked in `idle` (or a `noidle` is in flight) the
//! listener reassembles the idle reply itself, raises the status-changed
//! signal and re-arms idle unless the foreground is waiting or expects the
//! reply. Everything else is forwarded verbatim to the foreground.

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use mpd_proto::ReplyAssembler;

use super::{Link, lock};

const READ_CHUNK: usize = 4096;

pub(super) struct IdleListener {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl IdleListener {
    pub(super) fn spawn(
        reader: TcpStream,
        link: Arc<Mutex<Link>>,
        reply_tx: Sender<Vec<u8>>,
        changed_tx: Sender<()>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            reader,
            link,
            reply_tx,
            changed_tx,
            stop: stop.clone(),
            idle_reply: ReplyAssembler::new(),
        };
        let handle = std::thread::spawn(move || worker.run());
        Self { stop, handle }
    }

    /// Mark the next wake-up as intentional; the caller then unblocks the read.
    pub(super) fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub(super) fn join(self) {
        if self.handle.join().is_err() {
            tracing::warn!("idle listener panicked");
        }
    }
}

struct Worker {
    reader: TcpStream,
    link: Arc<Mutex<Link>>,
    reply_tx: Sender<Vec<u8>>,
    changed_tx: Sender<()>,
    stop: Arc<AtomicBool>,
    idle_reply: ReplyAssembler,
}

impl Worker {
    fn run(mut self) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let read = self.reader.read(&mut buf);
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            match read {
                Ok(0) => {
                    self.connection_lost("closed by server");
                    break;
                }
                Ok(n) => self.on_bytes(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.connection_lost(&e.to_string());
                    break;
                }
            }
        }
        tracing::debug!("idle listener exiting");
    }

    fn connection_lost(&self, reason: &str) {
        tracing::warn!(reason, "mpd connection lost");
        lock(&self.link).lost = true;
        // An empty delivery wakes a foreground reader blocked on a reply.
        let _ = self.reply_tx.send(Vec::new());
    }

    fn on_bytes(&mut self, bytes: &[u8]) {
        let mut link = lock(&self.link);
        if !(link.idle || link.noidle_sent) {
            drop(link);
            let _ = self.reply_tx.send(bytes.to_vec());
            return;
        }
        let Some(reply) = self.idle_reply.push(bytes) else {
            return;
        };
        link.idle = false;
        if reply.has_changes() {
            tracing::debug!(
                subsystems = ?reply.changed().collect::<Vec<_>>(),
                "mpd reported changes"
            );
            let _ = self.changed_tx.send(());
        }
        if link.noidle_sent {
            link.noidle_sent = false;
            drop(link);
            let _ = self.reply_tx.send(reply.encode());
            let rest = self.idle_reply.take_remainder();
            if !rest.is_empty() {
                let _ = self.reply_tx.send(rest);
            }
        } else if !reply.is_ok() {
            tracing::warn!(code = %reply.code, "mpd rejected idle");
        } else if !link.waiting {
            if let Err(e) = link.arm_idle() {
                tracing::warn!(error = %e, "failed to re-arm idle");
            }
        }
    }
}
