//! Backing image provisioning.

use std::fs::{self, OpenOptions};
use std::path::Path;

use flakey_core::{Error, FsType, Result};

use crate::command;

/// Creates a `size`-byte image at `path` and formats it with `fs_type`.
///
/// The file is created exclusively, so an existing image is never
/// overwritten. If formatting fails the half-made file is removed again.
///
/// # Errors
/// - [`Error::AlreadyExists`] if `path` exists
/// - [`Error::Io`] if the file cannot be created or truncated
/// - [`Error::ToolNotFound`] / [`Error::Command`] if `mkfs.<fs_type>` fails
pub fn create_image(path: &Path, fs_type: FsType, size: u64) -> Result<()> {
    let target = path.display().to_string();

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                Error::AlreadyExists {
                    what: "image",
                    target: target.clone(),
                }
            } else {
                Error::io("create image", &target, e)
            }
        })?;

    if let Err(e) = file.set_len(size) {
        drop(file);
        discard(path);
        return Err(Error::io("truncate image", &target, e));
    }
    drop(file);

    let mkfs = fs_type.mkfs_command();
    if let Err(e) = command::run(&mkfs, [path], &mkfs, &target) {
        discard(path);
        return Err(e);
    }

    tracing::info!("created {fs_type} image {target} ({size} bytes)");
    Ok(())
}

/// Removes the image at `path`.
///
/// Returns `Ok(false)` if it was already gone.
pub fn remove_image(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("removed image {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io("remove image", path.display(), e)),
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("failed to clean up image {}: {e}", path.display());
    }
}
