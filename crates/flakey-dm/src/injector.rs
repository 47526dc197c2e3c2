//! The mode-transition surface.

use std::path::PathBuf;

use flakey_core::{Direction, FeatureOptions, FsType, Result};

/// A controller that can switch a block device between fault modes.
///
/// Implemented by [`Flakey`](crate::Flakey); the power-failure simulator and
/// test fixtures are written against this trait so they can drive mocks.
pub trait FaultInjector {
    /// Path of the block device to mount.
    fn device_path(&self) -> PathBuf;

    /// Filesystem the device was formatted with.
    fn fs_type(&self) -> FsType;

    /// Passthrough: reads and writes reach the backing device.
    fn allow_writes(&mut self, opts: FeatureOptions) -> Result<()>;

    /// Writes are acknowledged but discarded.
    fn drop_writes(&mut self, opts: FeatureOptions) -> Result<()>;

    /// Writes fail with an I/O error.
    fn error_writes(&mut self, opts: FeatureOptions) -> Result<()>;

    /// Reads fail with an I/O error.
    fn error_reads(&mut self, opts: FeatureOptions) -> Result<()>;

    /// Corrupts byte `nth` of matching bios with `value`.
    fn corrupt_bio_byte(
        &mut self,
        nth: u32,
        direction: Direction,
        value: u8,
        flags: u32,
        opts: FeatureOptions,
    ) -> Result<()>;

    /// Corrupts a random byte of read bios.
    fn random_read_corrupt(&mut self, probability: u32, opts: FeatureOptions) -> Result<()>;

    /// Corrupts a random byte of write bios.
    fn random_write_corrupt(&mut self, probability: u32, opts: FeatureOptions) -> Result<()>;
}
