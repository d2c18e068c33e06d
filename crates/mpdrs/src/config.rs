//! Configuration loading and resolution.
//!
//! Each setting resolves from the command line first, then the optional TOML
//! file, then the built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::cli::Args;
use crate::fifo::FifoPaths;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_MPD_PORT: u16 = 6600;
pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_STREAM_PATH: &str = "/mpd.ogg";
pub const DEFAULT_BUFFER_THRESHOLD: usize = 7000;
pub const DEFAULT_BUFFER_CAP: usize = 1024 * 1024;
pub const DEFAULT_READ_CHUNK: usize = 2048;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_HEAD_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(50);
pub const DEFAULT_GREETING_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STREAM_START_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_PLAYER: &str = "mpv";
pub const DEFAULT_FIFO_DIR: &str = "/tmp";

/// Optional settings file (TOML).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// MPD / HTTP stream server address.
    pub host: Option<String>,
    /// MPD control port.
    pub mpd_port: Option<u16>,
    /// MPD httpd output port.
    pub http_port: Option<u16>,
    /// HTTP path of the stream.
    pub stream_path: Option<String>,
    /// Bytes buffered before the player is fed.
    pub buffer_bytes: Option<usize>,
    /// Hard cap on the startup buffer.
    pub buffer_cap: Option<usize>,
    /// Source socket read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Change-confirmation wait in milliseconds.
    pub wait_ms: Option<u64>,
    /// Pause between telling MPD to play and fetching the stream, in milliseconds.
    pub stream_start_delay_ms: Option<u64>,
    /// Media player binary.
    pub player: Option<PathBuf>,
    /// Directory for the named pipes.
    pub fifo_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    /// MPD control address (`host:port`).
    pub addr: String,
    /// Upper bound for [`crate::remote::ControlSession::wait`].
    pub wait_timeout: Duration,
    /// How long a fresh connection may take to send `OK MPD ...`.
    pub greeting_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            greeting_timeout: DEFAULT_GREETING_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StreamerConfig {
    /// HTTP stream address (`host:port`).
    pub addr: String,
    pub request_path: String,
    /// Named pipe the player reads from.
    pub sink_path: PathBuf,
    pub buffer_threshold: usize,
    pub buffer_cap: usize,
    pub read_chunk: usize,
    pub read_timeout: Duration,
    /// Upper bound for receiving the HTTP response head.
    pub head_timeout: Duration,
}

impl StreamerConfig {
    pub fn new(addr: impl Into<String>, sink_path: impl Into<PathBuf>) -> Self {
        Self {
            addr: addr.into(),
            request_path: DEFAULT_STREAM_PATH.to_string(),
            sink_path: sink_path.into(),
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            buffer_cap: DEFAULT_BUFFER_CAP,
            read_chunk: DEFAULT_READ_CHUNK,
            read_timeout: DEFAULT_READ_TIMEOUT,
            head_timeout: DEFAULT_HEAD_TIMEOUT,
        }
    }

    /// Buffered byte count that ends the buffering phase.
    ///
    /// The cap wins over a larger threshold: the buffer is flushed early
    /// rather than truncated.
    pub fn flush_threshold(&self) -> usize {
        self.buffer_threshold.min(self.buffer_cap)
    }
}

#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub program: PathBuf,
    /// Pipe passed to the player as `--input-file`.
    pub control_fifo: PathBuf,
    /// Pipe the player plays from.
    pub sink_fifo: PathBuf,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub streamer: StreamerConfig,
    pub player: PlayerConfig,
    pub fifos: FifoPaths,
    pub stream_start_delay: Duration,
}

impl AppConfig {
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let host = args
            .host
            .clone()
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        if host.trim().is_empty() {
            bail!("server host must not be empty");
        }
        let mpd_port = args.mpd_port.or(file.mpd_port).unwrap_or(DEFAULT_MPD_PORT);
        let http_port = args.http_port.or(file.http_port).unwrap_or(DEFAULT_HTTP_PORT);

        let stream_path = args
            .stream_path
            .clone()
            .or(file.stream_path)
            .unwrap_or_else(|| DEFAULT_STREAM_PATH.to_string());
        if !stream_path.starts_with('/') {
            bail!("stream path must start with '/': {stream_path}");
        }

        let buffer_cap = args.buffer_cap.or(file.buffer_cap).unwrap_or(DEFAULT_BUFFER_CAP);
        if buffer_cap == 0 {
            bail!("buffer cap must be positive");
        }

        let fifo_dir = args
            .fifo_dir
            .clone()
            .or(file.fifo_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FIFO_DIR));
        let fifos = FifoPaths::in_dir(&fifo_dir);

        let remote = RemoteConfig {
            addr: socket_addr(&host, mpd_port),
            wait_timeout: args
                .wait_ms
                .or(file.wait_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WAIT_TIMEOUT),
            greeting_timeout: DEFAULT_GREETING_TIMEOUT,
        };
        let streamer = StreamerConfig {
            request_path: stream_path,
            buffer_threshold: args
                .buffer_bytes
                .or(file.buffer_bytes)
                .unwrap_or(DEFAULT_BUFFER_THRESHOLD),
            buffer_cap,
            read_timeout: file
                .read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_READ_TIMEOUT),
            ..StreamerConfig::new(socket_addr(&host, http_port), fifos.sink.clone())
        };
        if streamer.read_timeout.is_zero() {
            bail!("read timeout must be positive");
        }
        let player = PlayerConfig {
            program: args
                .player
                .clone()
                .or(file.player)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLAYER)),
            control_fifo: fifos.control.clone(),
            sink_fifo: fifos.sink.clone(),
        };

        Ok(Self {
            remote,
            streamer,
            player,
            fifos,
            stream_start_delay: file
                .stream_start_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_STREAM_START_DELAY),
        })
    }
}

/// Resolve the effective configuration for a command line.
pub fn load(args: &Args) -> Result<AppConfig> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    AppConfig::resolve(args, file)
}

/// `host:port`, bracketing bare IPv6 literals.
fn socket_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
