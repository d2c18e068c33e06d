use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mpdrs::app::RemoteStreamer;
use mpdrs::{cli, config, player, streamer};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_directive())),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::load(&args)?;

    let Some(program) = player::locate(&config.player.program) else {
        bail!(
            "{} not found; make sure it is installed and on your PATH",
            config.player.program.display()
        );
    };
    tracing::debug!(program = ?program, "found player");

    streamer::probe(&config.streamer.addr, PROBE_TIMEOUT).with_context(|| {
        format!(
            "no http stream server at {}; check that mpd's httpd output is enabled and the address is right",
            config.streamer.addr
        )
    })?;

    // First interrupt asks the prompt to wind down; a second one exits at once.
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_signal = shutdown.clone();
    let _ = ctrlc::set_handler(move || {
        if shutdown_for_signal.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    });

    let app = RemoteStreamer::start(config)?;
    app.run(shutdown)
}
