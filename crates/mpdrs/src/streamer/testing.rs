//! Scripted HTTP origin for relay tests.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What the origin does after sending the response head.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Body {
    /// Send nothing more; keep the connection open until the client leaves.
    Hold,
    /// Send filler audio until the client leaves.
    Stream,
    /// Close the connection.
    Close,
}

pub(crate) const FILLER: u8 = b'a';

pub(crate) struct FakeOrigin {
    pub(crate) addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakeOrigin {
    /// `prelude` is sent in the same write as the response head.
    pub(crate) fn start(status: u16, prelude: &[u8], body: Body) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind origin");
        let addr = listener.local_addr().expect("origin addr");
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let prelude = prelude.to_vec();
        let accepted = connections.clone();
        let seen = requests.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                accepted.fetch_add(1, Ordering::SeqCst);
                let prelude = prelude.clone();
                let seen = seen.clone();
                std::thread::spawn(move || serve(stream, status, &prelude, body, &seen));
            }
        });
        Self {
            addr,
            connections,
            requests,
        }
    }

    pub(crate) fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(
    mut stream: TcpStream,
    status: u16,
    prelude: &[u8],
    body: Body,
    seen: &Mutex<Vec<Vec<u8>>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 512];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    seen.lock().unwrap().push(request);

    let mut response =
        format!("HTTP/1.1 {status} Whatever\r\nContent-Type: application/ogg\r\n\r\n").into_bytes();
    response.extend_from_slice(prelude);
    if stream.write_all(&response).is_err() {
        return;
    }
    match body {
        Body::Hold => while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        },
        Body::Stream => {
            let chunk = [FILLER; 256];
            while stream.write_all(&chunk).is_ok() {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        Body::Close => {}
    }
}

/// An address nothing listens on.
pub(crate) fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind vacant port");
    let addr = listener.local_addr().expect("vacant addr");
    drop(listener);
    addr.to_string()
}

pub(crate) fn temp_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("mpdrs-{tag}-{}-{nanos}", std::process::id()))
}
