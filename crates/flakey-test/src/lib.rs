// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # flakey-test
//!
//! Crash-consistency testing on top of a flakey device.
//!
//! This crate provides:
//! - **Power-failure simulation**: drop writes, unmount, restore, remount
//! - **Fixture**: a mounted flakey filesystem cleaned up on drop
//! - **Host probes**: skip cleanly without root or the required tools
//! - **Workloads**: run the application under test and kill it mid-flight
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use flakey_core::FsType;
//! use flakey_test::{FlakeyFixture, Workload, skip_reason};
//!
//! # async fn run() -> flakey_test::Result<()> {
//! if let Some(reason) = skip_reason(&[FsType::Ext4]) {
//!     eprintln!("skipping: {reason}");
//!     return Ok(());
//! }
//!
//! let mut fixture = FlakeyFixture::new("bench", FsType::Ext4, "")?;
//! let db = fixture.root_fs().join("db");
//! let output = Workload::new("bbolt")
//!     .args(["bench", "-work", "-path"])
//!     .arg(db.display().to_string())
//!     .run_for(Duration::from_secs(3))
//!     .await?;
//! assert!(output.killed);
//!
//! fixture.power_failure(None)?;
//! fixture.close()
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod harness;
pub mod power;
pub mod requires;
pub mod workload;

pub use error::{Result, Stage, TestError};
pub use harness::FlakeyFixture;
pub use power::{HostMounts, MountOps, MountSpec, simulate_power_failure};
pub use requires::{
    device_mapper_available, flakey_target_available, missing_commands, required_commands,
    requires_root, skip_reason,
};
pub use workload::{RunningWorkload, Workload, WorkloadOutput};
