//! Command-line interface definitions.
//!
//! Every setting is optional here so a config file can fill the gaps; see
//! [`crate::config`] for resolution and defaults.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(
    name = "mpdrs",
    version = VERSION,
    about = "Control an MPD server and listen to its HTTP stream locally"
)]
pub struct Args {
    /// Address of the MPD / HTTP stream server
    pub host: Option<String>,

    /// MPD control port (default 6600)
    pub mpd_port: Option<u16>,

    /// Port of MPD's httpd output (default 8000)
    pub http_port: Option<u16>,

    /// Optional config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HTTP path of the stream, e.g. /mpd.ogg
    #[arg(long)]
    pub stream_path: Option<String>,

    /// Bytes buffered before the player is fed (default 7000)
    #[arg(long)]
    pub buffer_bytes: Option<usize>,

    /// Hard cap on the startup buffer in bytes (default 1 MiB)
    #[arg(long)]
    pub buffer_cap: Option<usize>,

    /// How long to wait for the server to confirm a change, in ms (default 50)
    #[arg(long)]
    pub wait_ms: Option<u64>,

    /// Media player binary; must accept mpv's --input-file (default: mpv)
    #[arg(long)]
    pub player: Option<PathBuf>,

    /// Directory for the named pipes (default /tmp)
    #[arg(long)]
    pub fifo_dir: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "warn,mpdrs=info",
            2 => "info,mpdrs=debug",
            _ => "trace",
        }
    }
}
