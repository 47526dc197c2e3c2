//! Fault modes and the dm-flakey table compiler.
//!
//! A flakey table line has the shape
//!
//! ```text
//! <start> <sectors> flakey <device> <offset> <up interval> <down interval> [<num args> <args>...]
//! ```
//!
//! The kernel alternates between `up` seconds of passthrough and `down`
//! seconds of fault behaviour. Every mode here pins one side to the full
//! requested interval and the other to zero, so the device stays in a single
//! mode for the whole window.
//!
//! All knowledge of the line format lives in this module: [`FlakeyTable`]'s
//! `Display` is the serializer and its `FromStr` reads back what
//! `dmsetup table` reports.

use std::fmt;
use std::str::FromStr;

use crate::config::FeatureConfig;
use crate::error::{Error, Result};

/// Device-mapper target type.
pub const FLAKEY_TARGET: &str = "flakey";

/// Feature dropping all writes silently.
pub const DROP_WRITES: &str = "drop_writes";

/// Feature failing all writes with an error.
pub const ERROR_WRITES: &str = "error_writes";

/// Bio direction for byte corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read bios
    Read,
    /// Write bios
    Write,
}

/// Fault modes the kernel supports but which have no table encoding yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnimplementedMode {
    /// Every read fails with an error.
    ErrorReads,
    /// Replace one byte of the Nth read/write bio.
    CorruptBioByte {
        /// Byte offset within the bio
        nth: u32,
        /// Which bios to corrupt
        direction: Direction,
        /// Replacement byte value
        value: u8,
        /// Bio flags that must be set for corruption to apply
        flags: u32,
    },
    /// Replace a random byte in read bios.
    RandomReadCorrupt {
        /// Corruption probability
        probability: u32,
    },
    /// Replace a random byte in write bios.
    RandomWriteCorrupt {
        /// Corruption probability
        probability: u32,
    },
}

impl UnimplementedMode {
    /// Kernel feature name.
    #[must_use]
    pub const fn feature(&self) -> &'static str {
        match self {
            Self::ErrorReads => "error_reads",
            Self::CorruptBioByte { .. } => "corrupt_bio_byte",
            Self::RandomReadCorrupt { .. } => "random_read_corrupt",
            Self::RandomWriteCorrupt { .. } => "random_write_corrupt",
        }
    }
}

/// Requested behaviour of the flakey device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Passthrough.
    Allow,
    /// Writes are acknowledged but never reach the device.
    DropWrites,
    /// Writes fail with an I/O error.
    ErrorWrites,
    /// Declared but not encodable.
    Unimplemented(UnimplementedMode),
}

impl FaultMode {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Allow => "allow_writes",
            Self::DropWrites => DROP_WRITES,
            Self::ErrorWrites => ERROR_WRITES,
            Self::Unimplemented(mode) => mode.feature(),
        }
    }
}

impl fmt::Display for FaultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One flakey table line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakeyTable {
    /// Length of the mapping in 512-byte sectors.
    pub sectors: u64,
    /// Underlying device (path, or `major:minor` when read back).
    pub device: String,
    /// Start offset on the underlying device.
    pub offset: u64,
    /// Seconds of passthrough per cycle.
    pub up_secs: u32,
    /// Seconds of fault behaviour per cycle.
    pub down_secs: u32,
    /// Feature arguments (without the leading count).
    pub features: Vec<String>,
}

impl FlakeyTable {
    /// Compiles the table for `mode`.
    ///
    /// # Errors
    /// - [`Error::NotImplemented`] for modes without a table encoding
    /// - [`Error::MalformedTable`] for a zero size, an unusable device path or
    ///   an interval outside `1s..=u32::MAX s`
    pub fn compile(
        sectors: u64,
        device: &str,
        mode: &FaultMode,
        features: &FeatureConfig,
    ) -> Result<Self> {
        let (up_secs, down_secs, feature) = match mode {
            FaultMode::Allow => (interval_secs(features)?, 0, None),
            FaultMode::DropWrites => (0, interval_secs(features)?, Some(DROP_WRITES)),
            FaultMode::ErrorWrites => (0, interval_secs(features)?, Some(ERROR_WRITES)),
            FaultMode::Unimplemented(mode) => return Err(Error::NotImplemented(mode.feature())),
        };

        let table = Self {
            sectors,
            device: device.to_string(),
            offset: 0,
            up_secs,
            down_secs,
            features: feature.into_iter().map(String::from).collect(),
        };
        table.validate()?;
        Ok(table)
    }

    /// Checks the invariants the kernel enforces on a flakey table.
    pub fn validate(&self) -> Result<()> {
        if self.sectors == 0 {
            return Err(Error::malformed_table("device size is zero sectors"));
        }
        if self.device.is_empty() {
            return Err(Error::malformed_table("underlying device path is empty"));
        }
        if self.device.chars().any(char::is_whitespace) {
            return Err(Error::malformed_table(format!(
                "underlying device {:?} contains whitespace",
                self.device
            )));
        }
        if u64::from(self.up_secs) + u64::from(self.down_secs) == 0 {
            return Err(Error::malformed_table("total (up + down) interval is zero"));
        }
        Ok(())
    }

    /// Classifies the table back into a fault mode.
    ///
    /// Returns `None` for tables this crate would never produce (alternating
    /// intervals, unknown or multiple features).
    #[must_use]
    pub fn mode(&self) -> Option<FaultMode> {
        match (self.up_secs, self.down_secs, self.features.as_slice()) {
            (up, 0, []) if up > 0 => Some(FaultMode::Allow),
            (0, down, [f]) if down > 0 && f == DROP_WRITES => Some(FaultMode::DropWrites),
            (0, down, [f]) if down > 0 && f == ERROR_WRITES => Some(FaultMode::ErrorWrites),
            _ => None,
        }
    }

    /// Length of the fault window this table pins.
    #[must_use]
    pub const fn interval_secs(&self) -> u32 {
        if self.up_secs > 0 {
            self.up_secs
        } else {
            self.down_secs
        }
    }
}

fn interval_secs(features: &FeatureConfig) -> Result<u32> {
    let secs = features.interval.as_secs();
    if secs == 0 {
        return Err(Error::malformed_table(format!(
            "interval {:?} is shorter than one second",
            features.interval
        )));
    }
    u32::try_from(secs)
        .map_err(|_| Error::malformed_table(format!("interval of {secs}s does not fit in u32")))
}

impl fmt::Display for FlakeyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0 {} {FLAKEY_TARGET} {} {} {} {}",
            self.sectors, self.device, self.offset, self.up_secs, self.down_secs
        )?;
        if !self.features.is_empty() {
            write!(f, " {} {}", self.features.len(), self.features.join(" "))?;
        }
        Ok(())
    }
}

impl FromStr for FlakeyTable {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 7 {
            return Err(Error::malformed_table(format!(
                "expected at least 7 fields, got {}: {line:?}",
                tokens.len()
            )));
        }
        if tokens[0] != "0" {
            return Err(Error::malformed_table(format!(
                "mapping must start at sector 0: {line:?}"
            )));
        }
        if tokens[2] != FLAKEY_TARGET {
            return Err(Error::malformed_table(format!(
                "target type is {:?}, not {FLAKEY_TARGET}",
                tokens[2]
            )));
        }

        let sectors = parse_field(tokens[1], "sectors")?;
        let device = tokens[3].to_string();
        let offset = parse_field(tokens[4], "offset")?;
        let up_secs = parse_field(tokens[5], "up interval")?;
        let down_secs = parse_field(tokens[6], "down interval")?;

        let features = match tokens.get(7) {
            None => Vec::new(),
            Some(count) => {
                let count: usize = parse_field(count, "feature count")?;
                let rest = &tokens[8..];
                if rest.len() != count {
                    return Err(Error::malformed_table(format!(
                        "feature count {count} does not match {} arguments",
                        rest.len()
                    )));
                }
                rest.iter().map(|s| (*s).to_string()).collect()
            }
        };

        let table = Self {
            sectors,
            device,
            offset,
            up_secs,
            down_secs,
            features,
        };
        table.validate()?;
        Ok(table)
    }
}

fn parse_field<T: FromStr>(token: &str, field: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| Error::malformed_table(format!("invalid {field}: {token:?}")))
}
