//! Named pipes shared with the external player.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const SINK_FIFO_NAME: &str = "mpdrs-stream.fifo";
pub const CONTROL_FIFO_NAME: &str = "mpdrs-player-cmds.fifo";

/// The audio pipe and the player's command pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoPaths {
    pub sink: PathBuf,
    pub control: PathBuf,
}

impl FifoPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            sink: dir.join(SINK_FIFO_NAME),
            control: dir.join(CONTROL_FIFO_NAME),
        }
    }

    pub fn create(&self) -> Result<()> {
        ensure_fifo(&self.sink)?;
        ensure_fifo(&self.control)
    }

    pub fn remove(&self) {
        remove_fifo(&self.sink);
        remove_fifo(&self.control);
    }
}

/// Create a named pipe at `path`, reusing one left behind by an earlier run.
pub fn ensure_fifo(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if is_fifo(&meta) => {
            tracing::debug!(path = ?path, "reusing existing fifo");
            return Ok(());
        }
        Ok(_) => bail!("{:?} exists and is not a named pipe", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("stat {:?}", path)),
    }
    mkfifo(path).with_context(|| format!("create fifo {:?}", path))?;
    tracing::debug!(path = ?path, "created fifo");
    Ok(())
}

pub fn remove_fifo(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = ?path, "removed fifo"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = ?path, error = %e, "failed to remove fifo"),
    }
}

#[cfg(unix)]
fn is_fifo(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn mkfifo(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn mkfifo(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes need a unix platform",
    ))
}
