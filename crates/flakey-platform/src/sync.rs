//! Filesystem flush.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use flakey_core::{Error, Result};

/// Flushes all dirty data of the filesystem containing `path`.
///
/// REF: <https://man7.org/linux/man-pages/man2/syncfs.2.html>
pub fn syncfs(path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| Error::io("open", path.display(), e))?;

    // SAFETY: fd is open for the duration of the call.
    let rc = unsafe { libc::syncfs(file.as_raw_fd()) };
    if rc != 0 {
        return Err(Error::io("syncfs", path.display(), io::Error::last_os_error()));
    }
    tracing::debug!("synced filesystem of {}", path.display());
    Ok(())
}
