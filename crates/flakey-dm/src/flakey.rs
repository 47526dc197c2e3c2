//! The flakey controller.

use std::path::{Path, PathBuf};

use flakey_core::{
    Direction, FaultMode, FeatureConfig, FeatureOptions, FlakeyConfig, FlakeyTable, FsType,
    Result, UnimplementedMode, dm_device_path, image_file_name, validate_device_name,
};
use flakey_platform::LoopDevice;

use crate::backend::{Backend, LinuxBackend};
use crate::injector::FaultInjector;
use crate::lifecycle::{DeviceLifecycle, DeviceState, SyncRequest};
use crate::resources::{Resource, ResourceStack};

/// A formatted image exposed through a dm-flakey device.
///
/// Owns the backing image, the loop device and the flakey device for its
/// whole lifetime. Mode transitions come from [`FaultInjector`].
///
/// # Example
///
/// ```rust,no_run
/// use flakey_core::{FeatureOptions, FsType};
/// use flakey_dm::{FaultInjector, Flakey};
///
/// let mut flakey = Flakey::init("t1", "/var/tmp", FsType::Ext4)?;
/// flakey.drop_writes(FeatureOptions::new())?;
/// flakey.allow_writes(FeatureOptions::new())?;
/// flakey.teardown()?;
/// # Ok::<(), flakey_core::Error>(())
/// ```
#[derive(Debug)]
pub struct Flakey<B: Backend = LinuxBackend> {
    backend: B,
    fs_type: FsType,
    image_path: PathBuf,
    loop_device: LoopDevice,
    device: DeviceLifecycle,
    resources: ResourceStack,
    defaults: FeatureConfig,
    sync_target: Option<PathBuf>,
}

impl Flakey<LinuxBackend> {
    /// Creates `<store_dir>/<name>.img`, formats it, binds it to a loop
    /// device and exposes it as `/dev/mapper/<name>` in allow mode.
    ///
    /// Uses [`FlakeyConfig::default`].
    pub fn init(name: &str, store_dir: impl AsRef<Path>, fs_type: FsType) -> Result<Self> {
        Self::init_with(
            LinuxBackend,
            name,
            store_dir,
            fs_type,
            &FlakeyConfig::default(),
        )
    }
}

impl<B: Backend> Flakey<B> {
    /// [`Flakey::init`] with an explicit backend and configuration.
    ///
    /// Nothing is allocated until the name and configuration validate. If
    /// any step fails, everything acquired so far is released in reverse and
    /// the original error is returned.
    pub fn init_with(
        backend: B,
        name: &str,
        store_dir: impl AsRef<Path>,
        fs_type: FsType,
        config: &FlakeyConfig,
    ) -> Result<Self> {
        validate_device_name(name)?;
        config.validate()?;

        let image_path = store_dir.as_ref().join(image_file_name(name));
        let defaults = config.feature_defaults();
        let mut resources = ResourceStack::new();
        let mut device = DeviceLifecycle::new(name);

        let acquired = acquire(
            &backend,
            &image_path,
            fs_type,
            config.image_size,
            &defaults,
            &mut resources,
            &mut device,
        );
        let loop_device = match acquired {
            Ok(loop_device) => loop_device,
            Err(e) => {
                if let Err(cleanup) = resources.unwind(|r| release(&backend, &mut device, r)) {
                    tracing::warn!(
                        "cleanup after failed init of {name} left {} resource(s): {cleanup}",
                        resources.len()
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            "flakey device {name} ready on {} ({} sectors, {fs_type})",
            loop_device.path().display(),
            loop_device.sectors()
        );

        Ok(Self {
            backend,
            fs_type,
            image_path,
            loop_device,
            device,
            resources,
            defaults,
            sync_target: None,
        })
    }

    /// Device name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.device.name()
    }

    /// Backing image path.
    #[must_use]
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Loop device the image is bound to.
    #[must_use]
    pub const fn loop_device(&self) -> &LoopDevice {
        &self.loop_device
    }

    /// Device size in 512-byte sectors.
    #[must_use]
    pub const fn sectors(&self) -> u64 {
        self.loop_device.sectors()
    }

    /// Lifecycle state of the flakey device.
    #[must_use]
    pub const fn state(&self) -> DeviceState {
        self.device.state()
    }

    /// The backend this controller drives.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Table most recently loaded by this controller.
    #[must_use]
    pub const fn table(&self) -> Option<&FlakeyTable> {
        self.device.table()
    }

    /// Reads the table the kernel currently has loaded.
    pub fn live_table(&self) -> Result<FlakeyTable> {
        self.device.live_table(&self.backend)
    }

    /// Names the file or mount point whose filesystem is `syncfs`ed when a
    /// transition requests `sync_fs`.
    pub fn set_sync_target(&mut self, target: impl Into<PathBuf>) {
        self.sync_target = Some(target.into());
    }

    /// Current sync target, if any.
    #[must_use]
    pub fn sync_target(&self) -> Option<&Path> {
        self.sync_target.as_deref()
    }

    /// Removes the flakey device, detaches the loop device and deletes the
    /// image, in that order.
    ///
    /// Resources that are already gone are skipped. On a real failure the
    /// sequence stops and the error is returned; calling again resumes from
    /// the resource that failed. Once everything is released this is a no-op.
    pub fn teardown(&mut self) -> Result<()> {
        if self.resources.is_empty() {
            return Ok(());
        }

        let Self {
            backend,
            device,
            resources,
            ..
        } = self;
        resources.unwind(|r| release(backend, device, r))?;

        tracing::info!("flakey device {} torn down", device.name());
        Ok(())
    }

    fn transition(&mut self, mode: FaultMode, opts: FeatureOptions) -> Result<()> {
        let features = opts.resolve(&self.defaults);
        let table = FlakeyTable::compile(
            self.loop_device.sectors(),
            &self.loop_device.path().to_string_lossy(),
            &mode,
            &features,
        )?;

        let sync = SyncRequest {
            flush: features.sync_fs,
            target: self.sync_target.as_deref(),
        };
        self.device.reload(&self.backend, table, sync)?;

        tracing::info!(
            "flakey device {}: {mode} for {}s (sync_fs={})",
            self.device.name(),
            features.interval.as_secs(),
            features.sync_fs
        );
        Ok(())
    }
}

impl<B: Backend> FaultInjector for Flakey<B> {
    fn device_path(&self) -> PathBuf {
        dm_device_path(self.device.name())
    }

    fn fs_type(&self) -> FsType {
        self.fs_type
    }

    fn allow_writes(&mut self, opts: FeatureOptions) -> Result<()> {
        self.transition(FaultMode::Allow, opts)
    }

    fn drop_writes(&mut self, opts: FeatureOptions) -> Result<()> {
        self.transition(FaultMode::DropWrites, opts)
    }

    fn error_writes(&mut self, opts: FeatureOptions) -> Result<()> {
        self.transition(FaultMode::ErrorWrites, opts)
    }

    fn error_reads(&mut self, opts: FeatureOptions) -> Result<()> {
        self.transition(FaultMode::Unimplemented(UnimplementedMode::ErrorReads), opts)
    }

    fn corrupt_bio_byte(
        &mut self,
        nth: u32,
        direction: Direction,
        value: u8,
        flags: u32,
        opts: FeatureOptions,
    ) -> Result<()> {
        let mode = UnimplementedMode::CorruptBioByte {
            nth,
            direction,
            value,
            flags,
        };
        self.transition(FaultMode::Unimplemented(mode), opts)
    }

    fn random_read_corrupt(&mut self, probability: u32, opts: FeatureOptions) -> Result<()> {
        let mode = UnimplementedMode::RandomReadCorrupt { probability };
        self.transition(FaultMode::Unimplemented(mode), opts)
    }

    fn random_write_corrupt(&mut self, probability: u32, opts: FeatureOptions) -> Result<()> {
        let mode = UnimplementedMode::RandomWriteCorrupt { probability };
        self.transition(FaultMode::Unimplemented(mode), opts)
    }
}

impl<B: Backend> Drop for Flakey<B> {
    fn drop(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        tracing::warn!(
            "flakey device {} dropped without teardown, releasing {} resource(s)",
            self.device.name(),
            self.resources.len()
        );
        if let Err(e) = self.teardown() {
            tracing::warn!("teardown of {} on drop failed: {e}", self.device.name());
        }
    }
}

fn acquire<B: Backend>(
    backend: &B,
    image_path: &Path,
    fs_type: FsType,
    image_size: u64,
    defaults: &FeatureConfig,
    resources: &mut ResourceStack,
    device: &mut DeviceLifecycle,
) -> Result<LoopDevice> {
    backend.create_image(image_path, fs_type, image_size)?;
    resources.push(Resource::Image(image_path.to_path_buf()));

    let loop_device = backend.attach_loop(image_path)?;
    resources.push(Resource::LoopDevice(loop_device.path().to_path_buf()));

    let table = FlakeyTable::compile(
        loop_device.sectors(),
        &loop_device.path().to_string_lossy(),
        &FaultMode::Allow,
        defaults,
    )?;
    device.create(backend, table)?;
    resources.push(Resource::FlakeyDevice(device.name().to_string()));

    Ok(loop_device)
}

fn release<B: Backend>(
    backend: &B,
    device: &mut DeviceLifecycle,
    resource: &Resource,
) -> Result<bool> {
    match resource {
        Resource::FlakeyDevice(_) => device.remove(backend),
        Resource::LoopDevice(path) => backend.detach_loop(path),
        Resource::Image(path) => backend.remove_image(path),
    }
}
