//! Mount and busy-tolerant unmount.

use std::path::Path;
use std::thread;

use flakey_core::{Error, FsType, Result, UnmountPolicy};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};

/// Mounts `device` on `target` as `fs_type`.
///
/// `options` is the filesystem-specific data string (`mount -o`); empty
/// means none.
pub fn mount(device: &Path, target: &Path, fs_type: FsType, options: &str) -> Result<()> {
    let data = (!options.is_empty()).then_some(options);
    nix::mount::mount(
        Some(device),
        target,
        Some(fs_type.as_str()),
        MsFlags::empty(),
        data,
    )
    .map_err(|e| {
        Error::io(
            "mount",
            format!(
                "{} on {} (type {fs_type}, options {options:?})",
                device.display(),
                target.display()
            ),
            e.into(),
        )
    })?;

    tracing::info!("mounted {} on {}", device.display(), target.display());
    Ok(())
}

/// Unmounts the mount point at `target`.
///
/// `EBUSY` is retried per `policy`; `EINVAL` (not a mount point) counts as
/// already unmounted.
///
/// # Errors
/// Returns [`Error::Busy`] once the retry budget is spent.
pub fn unmount(target: &Path, policy: &UnmountPolicy) -> Result<()> {
    for attempt in 1..=policy.attempts {
        match nix::mount::umount2(target, MntFlags::empty()) {
            Ok(()) => {
                tracing::info!("unmounted {}", target.display());
                return Ok(());
            }
            Err(Errno::EINVAL) => return Ok(()),
            Err(Errno::EBUSY) => backoff(target, attempt, policy),
            Err(e) => return Err(Error::io("unmount", target.display(), e.into())),
        }
    }
    Err(busy(target, policy))
}

/// Unmounts every mount stacked on `target`.
///
/// Keeps unmounting until the kernel reports `EINVAL` (nothing left). Only
/// `EBUSY` answers count against `policy.attempts`; each successful unmount
/// peels one layer off the stack.
pub fn unmount_all(target: &Path, policy: &UnmountPolicy) -> Result<()> {
    let mut busy_attempts = 0;
    loop {
        match nix::mount::umount2(target, MntFlags::empty()) {
            Ok(()) => tracing::info!("unmounted {}", target.display()),
            Err(Errno::EINVAL) => return Ok(()),
            Err(Errno::EBUSY) => {
                busy_attempts += 1;
                if busy_attempts >= policy.attempts {
                    return Err(busy(target, policy));
                }
                backoff(target, busy_attempts, policy);
            }
            Err(e) => return Err(Error::io("unmount", target.display(), e.into())),
        }
    }
}

fn backoff(target: &Path, attempt: u32, policy: &UnmountPolicy) {
    tracing::warn!(
        "{} is busy (attempt {attempt}/{}), retrying in {:?}",
        target.display(),
        policy.attempts,
        policy.backoff
    );
    if attempt < policy.attempts {
        thread::sleep(policy.backoff);
    }
}

fn busy(target: &Path, policy: &UnmountPolicy) -> Error {
    Error::Busy {
        target: target.display().to_string(),
        attempts: policy.attempts,
    }
}
