//! Device-mapper control plane via `dmsetup`.
//!
//! Every device is addressed by name. Table swaps follow the
//! suspend → reload → resume protocol so the new table takes effect
//! atomically.

use flakey_core::{Error, Result, dm_device_path};

use crate::command::{self, output_contains};

/// The device-mapper userspace tool.
pub const DMSETUP: &str = "dmsetup";

/// Markers dmsetup prints when the named device does not exist.
const MISSING_MARKERS: [&str; 3] = ["No such device or address", "No such device", "not found"];

/// Checks whether `/dev/mapper/<name>` exists.
#[must_use]
pub fn device_exists(name: &str) -> bool {
    dm_device_path(name).exists()
}

/// Creates device `name` with `table`.
///
/// # Errors
/// - [`Error::AlreadyExists`] if a device with that name exists
/// - [`Error::Command`] with the kernel's message if the table is rejected
pub fn create(name: &str, table: &str) -> Result<()> {
    if device_exists(name) {
        return Err(already_exists(name));
    }

    match command::run(DMSETUP, ["create", name, "--table", table], "create device", name) {
        Ok(_) => {
            tracing::info!("created device-mapper device {name}: {table}");
            Ok(())
        }
        // create ioctl reports EBUSY for a name collision.
        Err(e) if output_contains(&e, "Device or resource busy") => Err(already_exists(name)),
        Err(e) => Err(e),
    }
}

/// Replaces the table of `name`.
///
/// With `flush_fs` the suspend lets device-mapper flush and freeze the
/// filesystem on top first; otherwise the device is suspended with
/// `--nolockfs`. Resume is attempted whenever the suspend succeeded.
pub fn reload(name: &str, table: &str, flush_fs: bool) -> Result<()> {
    let suspend: &[&str] = if flush_fs {
        &["suspend", name]
    } else {
        &["suspend", "--nolockfs", name]
    };
    command::run(DMSETUP, suspend, "suspend device", name)?;

    let reloaded = command::run(
        DMSETUP,
        ["reload", name, "--table", table],
        "reload table of",
        name,
    );
    let resumed = command::run(DMSETUP, ["resume", name], "resume device", name);

    match (reloaded, resumed) {
        (Ok(_), Ok(_)) => {
            tracing::debug!("reloaded {name}: {table}");
            Ok(())
        }
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(resume_err)) => {
            tracing::warn!("{name} left suspended after failed reload: {resume_err}");
            Err(e)
        }
        (Ok(_), Err(e)) => Err(e),
    }
}

/// Removes device `name`.
///
/// Returns `Ok(false)` if no such device exists.
pub fn remove(name: &str) -> Result<bool> {
    match command::run(DMSETUP, ["remove", name], "remove device", name) {
        Ok(_) => {
            tracing::info!("removed device-mapper device {name}");
            Ok(true)
        }
        Err(e) if is_missing(&e) => {
            tracing::debug!("device-mapper device {name} already removed");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Reads the live table of `name` as the kernel reports it.
///
/// # Errors
/// Returns [`Error::NotFound`] if no such device exists.
pub fn table(name: &str) -> Result<String> {
    match command::run(DMSETUP, ["table", name], "read table of", name) {
        Ok(out) => Ok(out.trim().to_string()),
        Err(e) if is_missing(&e) => Err(Error::NotFound {
            what: "device",
            target: name.to_string(),
        }),
        Err(e) => Err(e),
    }
}

fn is_missing(err: &Error) -> bool {
    MISSING_MARKERS.iter().any(|m| output_contains(err, m))
}

fn already_exists(name: &str) -> Error {
    Error::AlreadyExists {
        what: "device",
        target: name.to_string(),
    }
}
