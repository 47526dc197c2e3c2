//! Host capabilities consumed by the controller.
//!
//! [`Backend`] is the seam between the controller's resource and state
//! bookkeeping and the privileged operations that actually touch the host.
//! [`LinuxBackend`] is the real implementation; tests substitute a recording
//! mock.

use std::path::Path;

use flakey_core::{FlakeyTable, FsType, Result};
use flakey_platform::{LoopDevice, dmsetup, image, loopdev, sync};

/// Privileged host operations a flakey controller needs.
///
/// Removal operations return `Ok(false)` when the resource was already gone.
pub trait Backend {
    /// Creates and formats a backing image.
    fn create_image(&self, path: &Path, fs_type: FsType, size: u64) -> Result<()>;

    /// Deletes a backing image.
    fn remove_image(&self, path: &Path) -> Result<bool>;

    /// Binds an image to a loop device and reports its size.
    fn attach_loop(&self, image: &Path) -> Result<LoopDevice>;

    /// Unbinds a loop device.
    fn detach_loop(&self, device: &Path) -> Result<bool>;

    /// Creates a device-mapper device.
    fn create_device(&self, name: &str, table: &FlakeyTable) -> Result<()>;

    /// Swaps the table of a device-mapper device.
    fn reload_device(&self, name: &str, table: &FlakeyTable, flush_fs: bool) -> Result<()>;

    /// Removes a device-mapper device.
    fn remove_device(&self, name: &str) -> Result<bool>;

    /// Reads the live table of a device-mapper device.
    fn device_table(&self, name: &str) -> Result<FlakeyTable>;

    /// Flushes the filesystem containing `path`.
    fn syncfs(&self, path: &Path) -> Result<()>;
}

/// Backend driving the local Linux kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxBackend;

impl Backend for LinuxBackend {
    fn create_image(&self, path: &Path, fs_type: FsType, size: u64) -> Result<()> {
        image::create_image(path, fs_type, size)
    }

    fn remove_image(&self, path: &Path) -> Result<bool> {
        image::remove_image(path)
    }

    fn attach_loop(&self, image: &Path) -> Result<LoopDevice> {
        loopdev::attach(image)
    }

    fn detach_loop(&self, device: &Path) -> Result<bool> {
        loopdev::detach(device)
    }

    fn create_device(&self, name: &str, table: &FlakeyTable) -> Result<()> {
        dmsetup::create(name, &table.to_string())
    }

    fn reload_device(&self, name: &str, table: &FlakeyTable, flush_fs: bool) -> Result<()> {
        dmsetup::reload(name, &table.to_string(), flush_fs)
    }

    fn remove_device(&self, name: &str) -> Result<bool> {
        dmsetup::remove(name)
    }

    fn device_table(&self, name: &str) -> Result<FlakeyTable> {
        dmsetup::table(name)?.parse()
    }

    fn syncfs(&self, path: &Path) -> Result<()> {
        sync::syncfs(path)
    }
}
