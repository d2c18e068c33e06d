//! Scripted MPD server for session tests.
//!
//! Serves one client at a time, honours `idle`/`noidle` the way MPD does and
//! queues a subsystem notification whenever a command changes its state.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

pub(crate) const GREETING: &[u8] = b"OK MPD 0.23.5\n";

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) connections: AtomicUsize,
    pub(crate) idle: AtomicUsize,
    pub(crate) noidle: AtomicUsize,
    pub(crate) status: AtomicUsize,
}

struct Shared {
    state: Mutex<String>,
    playlist_len: AtomicUsize,
    fail_status: AtomicBool,
    client: Mutex<Option<TcpStream>>,
    commands: Mutex<Vec<String>>,
    counters: Counters,
}

pub(crate) struct FakeMpd {
    addr: SocketAddr,
    shared: Arc<Shared>,
    notify_tx: Sender<String>,
}

impl FakeMpd {
    pub(crate) fn start(initial_state: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake mpd");
        let addr = listener.local_addr().expect("fake mpd addr");
        let shared = Arc::new(Shared {
            state: Mutex::new(initial_state.to_string()),
            playlist_len: AtomicUsize::new(2),
            fail_status: AtomicBool::new(false),
            client: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
            counters: Counters::default(),
        });
        let (notify_tx, notify_rx) = crossbeam_channel::unbounded();
        let server = shared.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve(stream, &server, &notify_rx);
            }
        });
        Self {
            addr,
            shared,
            notify_tx,
        }
    }

    pub(crate) fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    /// Report a change in `subsystem` as if another client caused it.
    pub(crate) fn notify(&self, subsystem: &str) {
        self.notify_tx.send(subsystem.to_string()).unwrap();
    }

    pub(crate) fn set_fail_status(&self, fail: bool) {
        self.shared.fail_status.store(fail, Ordering::SeqCst);
    }

    /// Drop the current client connection.
    pub(crate) fn kick(&self) {
        if let Some(client) = self.shared.client.lock().unwrap().take() {
            let _ = client.shutdown(Shutdown::Both);
        }
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }

    pub(crate) fn state(&self) -> String {
        self.shared.state.lock().unwrap().clone()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn serve(stream: TcpStream, shared: &Shared, notify_rx: &Receiver<String>) {
    shared.counters.connections.fetch_add(1, Ordering::SeqCst);
    *shared.client.lock().unwrap() = stream.try_clone().ok();
    let Ok(mut writer) = stream.try_clone() else {
        return;
    };
    let _ = stream.set_read_timeout(Some(Duration::from_millis(5)));
    let mut reader = BufReader::new(stream);
    if writer.write_all(GREETING).is_err() {
        return;
    }

    let mut idling = false;
    let mut pending: Vec<String> = Vec::new();
    let mut line = Vec::new();
    loop {
        pending.extend(notify_rx.try_iter());
        if idling && !pending.is_empty() {
            idling = false;
            if writer.write_all(&changed_reply(&mut pending)).is_err() {
                return;
            }
        }

        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return,
            Ok(_) if line.ends_with(b"\n") => {}
            Ok(_) => return,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(_) => return,
        }
        let command = String::from_utf8_lossy(&line).trim().to_string();
        line.clear();
        shared.commands.lock().unwrap().push(command.clone());

        let reply = match command.as_str() {
            "idle" => {
                shared.counters.idle.fetch_add(1, Ordering::SeqCst);
                if pending.is_empty() {
                    idling = true;
                    continue;
                }
                changed_reply(&mut pending)
            }
            "noidle" => {
                shared.counters.noidle.fetch_add(1, Ordering::SeqCst);
                if !idling {
                    continue;
                }
                idling = false;
                b"OK\n".to_vec()
            }
            // MPD drops clients that send anything else while idle.
            _ if idling => return,
            other => respond(shared, other, &mut pending).into_bytes(),
        };
        if writer.write_all(&reply).is_err() {
            return;
        }
    }
}

fn changed_reply(pending: &mut Vec<String>) -> Vec<u8> {
    let mut reply = String::new();
    for subsystem in pending.drain(..) {
        reply.push_str(&format!("changed: {subsystem}\n"));
    }
    reply.push_str("OK\n");
    reply.into_bytes()
}

const FIRST_SONG: &str = "file: a.ogg\nArtist: Someone\nTitle: First\nAlbum: Record\nPos: 0\nId: 1\n";
const SECOND_SONG: &str = "file: b.ogg\nArtist: Other\nTitle: Second\nPos: 1\nId: 2\n";

fn respond(shared: &Shared, command: &str, pending: &mut Vec<String>) -> String {
    let set_state = |pending: &mut Vec<String>, next: &str| {
        let mut state = shared.state.lock().unwrap();
        if *state != next {
            *state = next.to_string();
            pending.push("player".to_string());
        }
    };
    match command {
        "status" => {
            shared.counters.status.fetch_add(1, Ordering::SeqCst);
            if shared.fail_status.load(Ordering::SeqCst) {
                return "ACK [5@0] {status} forced failure\n".to_string();
            }
            let state = shared.state.lock().unwrap().clone();
            let length = shared.playlist_len.load(Ordering::SeqCst);
            let mut body =
                format!("volume: 50\nrepeat: 0\nrandom: 0\nplaylistlength: {length}\nstate: {state}\n");
            if state != "stop" && length > 0 {
                body.push_str("song: 0\nsongid: 1\nelapsed: 1.500\n");
            }
            body + "OK\n"
        }
        "playlistid 1" => format!("{FIRST_SONG}OK\n"),
        "playlistinfo" if shared.playlist_len.load(Ordering::SeqCst) == 0 => "OK\n".to_string(),
        "playlistinfo" => format!("{FIRST_SONG}{SECOND_SONG}OK\n"),
        "play" => {
            set_state(pending, "play");
            "OK\n".to_string()
        }
        "pause 1" => {
            set_state(pending, "pause");
            "OK\n".to_string()
        }
        "stop" => {
            set_state(pending, "stop");
            "OK\n".to_string()
        }
        "next" | "previous" => {
            pending.push("player".to_string());
            "OK\n".to_string()
        }
        "clear" => {
            shared.playlist_len.store(0, Ordering::SeqCst);
            pending.push("playlist".to_string());
            set_state(pending, "stop");
            "OK\n".to_string()
        }
        "clearerror" => "OK\n".to_string(),
        "update" => {
            pending.push("update".to_string());
            "updating_db: 1\nOK\n".to_string()
        }
        _ if command.starts_with("findadd ") && command.len() > "findadd ".len() => {
            pending.push("playlist".to_string());
            "OK\n".to_string()
        }
        _ if command.starts_with("find ") => format!("{FIRST_SONG}OK\n"),
        _ => format!("ACK [5@0] {{{command}}} unknown command\n"),
    }
}
