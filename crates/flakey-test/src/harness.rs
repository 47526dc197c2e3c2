//! Mounted flakey test fixture.

use std::path::Path;

use flakey_core::{FlakeyConfig, FsType};
use flakey_dm::{FaultInjector, Flakey, LinuxBackend};
use tempfile::TempDir;

use crate::error::Result;
use crate::power::{HostMounts, MountOps, MountSpec, simulate_power_failure};

/// A flakey device with a filesystem mounted on a temporary directory.
///
/// Dropping the fixture unmounts the filesystem and tears the device down;
/// failures are logged. Use [`close`](Self::close) to observe them instead.
///
/// ```rust,no_run
/// use flakey_core::FsType;
/// use flakey_test::FlakeyFixture;
///
/// let mut fixture = FlakeyFixture::new("t1", FsType::Ext4, "")?;
/// std::fs::write(fixture.root_fs().join("a"), b"lost")?;
/// fixture.power_failure(None)?;
/// assert!(!fixture.root_fs().join("a").exists());
/// fixture.close()?;
/// # Ok::<(), flakey_test::TestError>(())
/// ```
#[derive(Debug)]
pub struct FlakeyFixture {
    flakey: Flakey<LinuxBackend>,
    mounts: HostMounts,
    spec: MountSpec,
    released: bool,
    // Declared last: dropped after the filesystem is unmounted.
    _root: TempDir,
    _store: TempDir,
}

impl FlakeyFixture {
    /// Creates a 10 GiB device, formats it as `fs_type` and mounts it with
    /// `mount_options`.
    pub fn new(name: &str, fs_type: FsType, mount_options: &str) -> Result<Self> {
        Self::with_config(name, fs_type, mount_options, &FlakeyConfig::default())
    }

    /// [`new`](Self::new) with an explicit configuration.
    pub fn with_config(
        name: &str,
        fs_type: FsType,
        mount_options: &str,
        config: &FlakeyConfig,
    ) -> Result<Self> {
        let store = tempfile::tempdir()?;
        let mut flakey = Flakey::init_with(LinuxBackend, name, store.path(), fs_type, config)?;

        let root = tempfile::tempdir()?;
        let spec = MountSpec::new(root.path(), fs_type, mount_options);
        let mounts = HostMounts::new(config.unmount);
        mounts.mount(&flakey.device_path(), &spec.target, fs_type, &spec.options)?;
        flakey.set_sync_target(root.path());

        tracing::info!("{name} mounted on {}", root.path().display());
        Ok(Self {
            flakey,
            mounts,
            spec,
            released: false,
            _root: root,
            _store: store,
        })
    }

    /// Mount point of the flakey filesystem.
    #[must_use]
    pub fn root_fs(&self) -> &Path {
        &self.spec.target
    }

    /// Mount options the fixture was created with.
    #[must_use]
    pub fn mount_options(&self) -> &str {
        &self.spec.options
    }

    /// The underlying controller.
    #[must_use]
    pub const fn flakey(&self) -> &Flakey<LinuxBackend> {
        &self.flakey
    }

    /// The underlying controller, for explicit mode transitions.
    pub fn flakey_mut(&mut self) -> &mut Flakey<LinuxBackend> {
        &mut self.flakey
    }

    /// Simulates a power failure and remounts, with `options_override` or
    /// the original mount options.
    pub fn power_failure(&mut self, options_override: Option<&str>) -> Result<()> {
        simulate_power_failure(
            &mut self.flakey,
            &self.mounts,
            &self.spec,
            options_override,
        )
    }

    /// Unmounts and tears down, reporting failures.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.mounts.unmount_all(&self.spec.target)?;
        self.flakey.teardown()?;
        self.released = true;
        Ok(())
    }
}

impl Drop for FlakeyFixture {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(
                "failed to clean up fixture {}: {e}",
                self.flakey.name()
            );
        }
    }
}
