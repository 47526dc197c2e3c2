// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # flakey-core
//!
//! Core types for driving a device-mapper `flakey` device.
//!
//! - [`Error`] - the error taxonomy shared by every flakey crate
//! - [`FsType`] - filesystems a backing image can be formatted with
//! - [`FeatureConfig`] / [`FeatureOptions`] - per-call fault window and pre-sync
//! - [`FlakeyConfig`] - controller configuration, loadable from TOML
//! - [`FaultMode`] / [`FlakeyTable`] - the table compiler
//!
//! Nothing in this crate touches a device; it is safe to use on any host.
//!
//! ## Example
//!
//! ```rust
//! use flakey_core::{FaultMode, FeatureConfig, FlakeyTable};
//!
//! let table = FlakeyTable::compile(
//!     20_971_520,
//!     "/dev/loop0",
//!     &FaultMode::DropWrites,
//!     &FeatureConfig::default(),
//! )?;
//! assert_eq!(table.to_string(), "0 20971520 flakey /dev/loop0 0 0 120 1 drop_writes");
//! # Ok::<(), flakey_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod table;
pub mod types;

pub use config::{FeatureConfig, FeatureOptions, FlakeyConfig, UnmountPolicy};
pub use error::{Error, Result};
pub use table::{Direction, FaultMode, FlakeyTable, UnimplementedMode};
pub use types::{FsType, SECTOR_SIZE, dm_device_path, image_file_name, validate_device_name};
