//! Shared value types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bytes per device-mapper sector.
pub const SECTOR_SIZE: u64 = 512;

/// Prefix of device-mapper device nodes.
pub const DM_DEV_PREFIX: &str = "/dev/mapper";

/// Filesystem written into the backing image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    /// ext4
    Ext4,
    /// XFS
    Xfs,
}

impl FsType {
    /// All supported filesystems.
    pub const ALL: [Self; 2] = [Self::Ext4, Self::Xfs];

    /// Name as understood by `mount(2)`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
        }
    }

    /// Formatting tool for this filesystem (`mkfs.<type>`).
    #[must_use]
    pub fn mkfs_command(self) -> String {
        format!("mkfs.{}", self.as_str())
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ext4" => Ok(Self::Ext4),
            "xfs" => Ok(Self::Xfs),
            other => Err(Error::UnsupportedFilesystem(other.to_string())),
        }
    }
}

/// Checks a device-mapper device name.
///
/// The name becomes both `/dev/mapper/<name>` and `<name>.img`, so it must be
/// a single non-empty path component without whitespace.
pub fn validate_device_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::config("device name cannot be empty"));
    }
    if name == "." || name == ".." || name.contains('/') {
        return Err(Error::config(format!(
            "device name {name:?} must be a single path component"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(Error::config(format!(
            "device name {name:?} cannot contain whitespace"
        )));
    }
    // DM_NAME_LEN is 128 including the trailing NUL.
    if name.len() > 127 {
        return Err(Error::config(format!(
            "device name is {} bytes, limit is 127",
            name.len()
        )));
    }
    Ok(())
}

/// Path of the device-mapper node for `name`.
#[must_use]
pub fn dm_device_path(name: &str) -> PathBuf {
    PathBuf::from(DM_DEV_PREFIX).join(name)
}

/// File name of the backing image for `name`.
#[must_use]
pub fn image_file_name(name: &str) -> String {
    format!("{name}.img")
}
