//! Controller and per-call feature configuration.
//!
//! Configuration is validated at load time, with sensible defaults and clear
//! error messages. Per-call [`FeatureOptions`] are never stored: they are
//! merged over the controller's [`FeatureConfig`] defaults at the call
//! boundary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::SECTOR_SIZE;

/// Default backing image size (10 GiB).
pub const DEFAULT_IMAGE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Default fault window.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Default number of unmount attempts.
pub const DEFAULT_UNMOUNT_ATTEMPTS: u32 = 50;

/// Default sleep between busy unmount attempts.
pub const DEFAULT_UNMOUNT_BACKOFF: Duration = Duration::from_millis(500);

/// Resolved feature configuration for one mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureConfig {
    /// How long the requested mode lasts before the device would flip back.
    pub interval: Duration,
    /// Flush the filesystem before the new table is applied.
    pub sync_fs: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            sync_fs: false,
        }
    }
}

/// Per-call overrides for a mode transition.
///
/// ```rust
/// use std::time::Duration;
/// use flakey_core::{FeatureConfig, FeatureOptions};
///
/// let opts = FeatureOptions::new()
///     .interval(Duration::from_secs(30))
///     .sync_fs(true);
///
/// let resolved = opts.resolve(&FeatureConfig::default());
/// assert_eq!(resolved.interval, Duration::from_secs(30));
/// assert!(resolved.sync_fs);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureOptions {
    interval: Option<Duration>,
    sync_fs: Option<bool>,
}

impl FeatureOptions {
    /// No overrides; every field falls back to the controller default.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: None,
            sync_fs: None,
        }
    }

    /// Sets how long the requested mode lasts.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Requests a filesystem flush before the table swap.
    #[must_use]
    pub const fn sync_fs(mut self, sync_fs: bool) -> Self {
        self.sync_fs = Some(sync_fs);
        self
    }

    /// Merges these overrides over `defaults`.
    #[must_use]
    pub fn resolve(&self, defaults: &FeatureConfig) -> FeatureConfig {
        FeatureConfig {
            interval: self.interval.unwrap_or(defaults.interval),
            sync_fs: self.sync_fs.unwrap_or(defaults.sync_fs),
        }
    }
}

/// Controller configuration.
///
/// ```toml
/// image_size = 10737418240
/// interval = "2m"
///
/// [unmount]
/// attempts = 50
/// backoff = "500ms"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlakeyConfig {
    /// Backing image size in bytes.
    #[serde(default = "default_image_size")]
    pub image_size: u64,

    /// Default fault window for mode transitions.
    #[serde(default = "default_interval", with = "humantime_duration")]
    pub interval: Duration,

    /// Busy-retry policy for unmounting.
    #[serde(default)]
    pub unmount: UnmountPolicy,
}

fn default_image_size() -> u64 {
    DEFAULT_IMAGE_SIZE
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

impl Default for FlakeyConfig {
    fn default() -> Self {
        Self {
            image_size: default_image_size(),
            interval: default_interval(),
            unmount: UnmountPolicy::default(),
        }
    }
}

impl FlakeyConfig {
    /// Defaults for mode transitions derived from this configuration.
    #[must_use]
    pub fn feature_defaults(&self) -> FeatureConfig {
        FeatureConfig {
            interval: self.interval,
            sync_fs: false,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(Error::config("image_size must be greater than 0"));
        }
        if self.image_size % SECTOR_SIZE != 0 {
            return Err(Error::config(format!(
                "image_size {} is not a multiple of {SECTOR_SIZE}",
                self.image_size
            )));
        }
        if self.interval < Duration::from_secs(1) {
            return Err(Error::config(format!(
                "interval {} is shorter than one second",
                humantime::format_duration(self.interval)
            )));
        }
        self.unmount.validate()?;
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }
}

/// Bounded busy-retry policy for unmounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmountPolicy {
    /// Maximum attempts before giving up with [`Error::Busy`].
    #[serde(default = "default_unmount_attempts")]
    pub attempts: u32,

    /// Sleep between attempts that fail with `EBUSY`.
    #[serde(default = "default_unmount_backoff", with = "humantime_duration")]
    pub backoff: Duration,
}

fn default_unmount_attempts() -> u32 {
    DEFAULT_UNMOUNT_ATTEMPTS
}

fn default_unmount_backoff() -> Duration {
    DEFAULT_UNMOUNT_BACKOFF
}

impl Default for UnmountPolicy {
    fn default() -> Self {
        Self {
            attempts: default_unmount_attempts(),
            backoff: default_unmount_backoff(),
        }
    }
}

impl UnmountPolicy {
    /// Validates the policy.
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(Error::config("unmount.attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Serde adapter for humantime strings such as `"2m"` or `"500ms"`.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
