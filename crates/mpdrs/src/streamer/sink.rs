//! Write side of the pipe the player reads audio from.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// Lazily opened writer for the player's audio pipe.
///
/// Opening a fifo for writing blocks until the player opens its read end, so
/// the relay only opens it once there is audio to hand over.
pub(crate) struct PipeSink {
    path: PathBuf,
    file: Option<File>,
}

impl PipeSink {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub(crate) fn open(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            tracing::debug!(path = ?self.path, "opening sink");
            self.file = Some(OpenOptions::new().write(true).open(&self.path)?);
        }
        Ok(())
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "sink is not open"))?;
        file.write_all(bytes)
    }

    /// A reader that already went away is not an error here.
    pub(crate) fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                tracing::debug!(path = ?self.path, error = %e, "flush on sink close failed");
            }
            tracing::debug!(path = ?self.path, "sink closed");
        }
    }
}
