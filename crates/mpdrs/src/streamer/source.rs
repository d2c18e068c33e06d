//! Fetch connection to the HTTP audio origin.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::config::StreamerConfig;

pub(crate) struct AudioSource {
    stream: TcpStream,
    chunk: usize,
}

impl AudioSource {
    /// Connect, request the stream and consume the response head.
    ///
    /// Returns the source together with any payload bytes that arrived in the
    /// same reads as the head.
    pub(crate) fn open(config: &StreamerConfig) -> io::Result<(Self, Vec<u8>)> {
        let mut stream = TcpStream::connect(&config.addr)?;
        let _ = stream.set_nodelay(true);
        stream.write_all(&mpd_proto::encode_fetch_request(&config.request_path))?;
        stream.set_read_timeout(Some(config.read_timeout))?;
        let captured = read_head(&mut stream, config.head_timeout)?;
        tracing::info!(
            addr = %config.addr,
            path = %config.request_path,
            captured = captured.len(),
            "http stream opened"
        );
        Ok((
            Self {
                stream,
                chunk: config.read_chunk.max(1),
            },
            captured,
        ))
    }

    /// One bounded read. An empty chunk means the read timed out.
    pub(crate) fn receive(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed by server",
            )),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_retryable(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Check that an origin accepts connections at all.
pub fn probe(addr: &str, timeout: Duration) -> io::Result<()> {
    let mut last = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(_) => return Ok(()),
            Err(e) => last = Some(e),
        }
    }
    Err(last.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{addr} did not resolve"))
    }))
}

fn read_head(stream: &mut TcpStream, timeout: Duration) -> io::Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream server closed before the response head",
                ));
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if is_retryable(&e) => {}
            Err(e) => return Err(e),
        }
        if let Some(head) = mpd_proto::parse_response_head(&buf)? {
            if !head.is_success() {
                return Err(io::Error::other(format!(
                    "stream server answered with status {}",
                    head.status
                )));
            }
            return Ok(buf.split_off(head.body_offset));
        }
        if Instant::now() >= deadline {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no response head from stream server",
            ));
        }
    }
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::testing::{Body, FILLER, FakeOrigin, closed_addr};

    fn config_for(addr: String) -> StreamerConfig {
        StreamerConfig {
            read_timeout: Duration::from_millis(20),
            ..StreamerConfig::new(addr, "/dev/null")
        }
    }

    #[test]
    fn open_sends_request_and_keeps_captured_payload() {
        let origin = FakeOrigin::start(200, b"OggS-prelude", Body::Hold);
        let (_source, captured) = AudioSource::open(&config_for(origin.addr_string())).unwrap();
        assert_eq!(captured, b"OggS-prelude");
        assert_eq!(
            origin.requests(),
            vec![b"GET /mpd.ogg HTTP/1.1\r\nAccept: */*\r\n\r\n".to_vec()]
        );
    }

    #[test]
    fn receive_returns_empty_on_timeout_and_data_when_available() {
        let origin = FakeOrigin::start(200, b"", Body::Hold);
        let (mut source, _) = AudioSource::open(&config_for(origin.addr_string())).unwrap();
        assert!(source.receive().unwrap().is_empty());

        let streaming = FakeOrigin::start(200, b"", Body::Stream);
        let (mut source, _) = AudioSource::open(&config_for(streaming.addr_string())).unwrap();
        let chunk = (0..50)
            .map(|_| source.receive().unwrap())
            .find(|c| !c.is_empty())
            .unwrap();
        assert!(chunk.iter().all(|&b| b == FILLER));
    }

    #[test]
    fn receive_reports_end_of_stream() {
        let origin = FakeOrigin::start(200, b"", Body::Close);
        let (mut source, _) = AudioSource::open(&config_for(origin.addr_string())).unwrap();
        let err = (0..50).find_map(|_| source.receive().err()).unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn error_status_is_rejected() {
        let origin = FakeOrigin::start(404, b"", Body::Hold);
        let err = AudioSource::open(&config_for(origin.addr_string())).err().unwrap();
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn probe_distinguishes_listening_and_closed_ports() {
        let origin = FakeOrigin::start(200, b"", Body::Hold);
        assert!(probe(&origin.addr_string(), Duration::from_secs(1)).is_ok());
        assert!(probe(&closed_addr(), Duration::from_secs(1)).is_err());
    }
}
