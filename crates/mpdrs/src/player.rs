//! External media player driven through its `--input-file` command pipe.
//!
//! The player is launched as `<program> --input-file=<control fifo> <sink fifo>`
//! and reads audio from the sink pipe the relay writes. Each command is one
//! open-write-close of the control pipe.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::PlayerConfig;

const TOGGLE_PAUSE: &str = "cycle pause";
const QUIT: &str = "quit";
const QUIT_GRACE: Duration = Duration::from_secs(1);

pub struct ExternalPlayer {
    config: PlayerConfig,
    child: Option<Child>,
    playing: bool,
}

impl ExternalPlayer {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            child: None,
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub fn launch_args(&self) -> Vec<OsString> {
        let mut input = OsString::from("--input-file=");
        input.push(&self.config.control_fifo);
        vec![input, self.config.sink_fifo.clone().into_os_string()]
    }

    /// Launch the player, or unpause it if it is already running.
    pub fn play(&mut self) -> Result<()> {
        if !self.is_running() {
            self.reap();
            self.launch()?;
        } else if !self.playing {
            self.send_command(TOGGLE_PAUSE)?;
        }
        self.playing = true;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.playing && self.child.is_some() {
            self.send_command(TOGGLE_PAUSE)?;
        }
        self.playing = false;
        Ok(())
    }

    /// Ask the player to exit and reap it, killing it after a grace period.
    pub fn quit(&mut self) -> Result<()> {
        if self.child.is_none() {
            return Ok(());
        }
        let sent = if self.is_running() {
            self.send_command(QUIT)
        } else {
            Ok(())
        };
        self.playing = false;
        self.reap();
        sent
    }

    /// Write one command line to the control pipe.
    pub fn send_command(&mut self, line: &str) -> Result<()> {
        let mut pipe = open_control_pipe(&self.config.control_fifo)
            .with_context(|| format!("open player control pipe {:?}", self.config.control_fifo))?;
        pipe.write_all(format!("{line}\n").as_bytes())
            .with_context(|| format!("send {line:?} to player"))?;
        tracing::debug!(command = line, "player command sent");
        Ok(())
    }

    fn launch(&mut self) -> Result<()> {
        let child = Command::new(&self.config.program)
            .args(self.launch_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launch player {:?}", self.config.program))?;
        tracing::info!(pid = child.id(), program = ?self.config.program, "player launched");
        self.child = Some(child);
        Ok(())
    }

    fn reap(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let deadline = Instant::now() + QUIT_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(%status, "player exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Ok(None) | Err(_) => break,
            }
        }
        tracing::warn!(pid = child.id(), "player did not exit; killing it");
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for ExternalPlayer {
    fn drop(&mut self) {
        self.reap();
    }
}

/// Look `program` up on `PATH` unless it already names a path.
pub fn locate(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    })
}

/// Opening without a reader fails instead of blocking.
#[cfg(unix)]
fn open_control_pipe(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_control_pipe(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).open(path)
}
