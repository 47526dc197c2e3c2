//! Power-failure simulation.
//!
//! A power cut is modelled as: stop persisting writes, tear the filesystem
//! down without a clean flush reaching the device, restore the device and
//! mount again. Whatever was on the device before the first step survives;
//! everything else is gone.

use std::path::{Path, PathBuf};

use flakey_core::{FeatureOptions, FsType, UnmountPolicy};
use flakey_dm::FaultInjector;
use flakey_platform::mount;

use crate::error::{Result, Stage, TestError};

/// Mount and unmount, as seen by the simulator.
pub trait MountOps {
    /// Mounts `device` on `target`.
    fn mount(
        &self,
        device: &Path,
        target: &Path,
        fs_type: FsType,
        options: &str,
    ) -> flakey_core::Result<()>;

    /// Unmounts every filesystem stacked on `target`.
    fn unmount_all(&self, target: &Path) -> flakey_core::Result<()>;
}

/// [`MountOps`] on the host via `mount(2)`/`umount2(2)`.
#[derive(Debug, Clone, Default)]
pub struct HostMounts {
    policy: UnmountPolicy,
}

impl HostMounts {
    /// Host mounts with a custom busy-retry policy.
    #[must_use]
    pub const fn new(policy: UnmountPolicy) -> Self {
        Self { policy }
    }

    /// Busy-retry policy used for unmounting.
    #[must_use]
    pub const fn policy(&self) -> &UnmountPolicy {
        &self.policy
    }
}

impl MountOps for HostMounts {
    fn mount(
        &self,
        device: &Path,
        target: &Path,
        fs_type: FsType,
        options: &str,
    ) -> flakey_core::Result<()> {
        mount::mount(device, target, fs_type, options)
    }

    fn unmount_all(&self, target: &Path) -> flakey_core::Result<()> {
        mount::unmount_all(target, &self.policy)
    }
}

/// Where and how the flakey device is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Mount point.
    pub target: PathBuf,
    /// Filesystem type.
    pub fs_type: FsType,
    /// Filesystem-specific mount data, e.g. `"nobarrier"`.
    pub options: String,
}

impl MountSpec {
    /// Creates a mount spec.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>, fs_type: FsType, options: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            fs_type,
            options: options.into(),
        }
    }
}

/// Simulates a power failure on a mounted flakey device.
///
/// 1. `drop_writes`
/// 2. unmount `spec.target` recursively
/// 3. `allow_writes`
/// 4. mount again with `options_override`, or `spec.options` when `None`
///
/// The first failing stage aborts the sequence and is reported as
/// [`TestError::Stage`].
pub fn simulate_power_failure<F, M>(
    flakey: &mut F,
    mounts: &M,
    spec: &MountSpec,
    options_override: Option<&str>,
) -> Result<()>
where
    F: FaultInjector + ?Sized,
    M: MountOps + ?Sized,
{
    let target = spec.target.as_path();
    tracing::info!("simulating power failure on {}", target.display());

    flakey
        .drop_writes(FeatureOptions::new())
        .map_err(|e| TestError::stage(Stage::DropWrites, e))?;

    mounts
        .unmount_all(target)
        .map_err(|e| TestError::stage(Stage::Unmount, e))?;

    flakey
        .allow_writes(FeatureOptions::new())
        .map_err(|e| TestError::stage(Stage::AllowWrites, e))?;

    let options = options_override.unwrap_or(spec.options.as_str());
    mounts
        .mount(&flakey.device_path(), target, spec.fs_type, options)
        .map_err(|e| TestError::stage(Stage::Mount, e))?;

    tracing::info!("{} remounted after power failure", target.display());
    Ok(())
}
