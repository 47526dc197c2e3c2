//! dmflakey: crash-consistency testing with device-mapper `flakey` devices.
//!
//! A [`Flakey`](flakey_dm::Flakey) controller formats a backing image, binds
//! it to a loop device and exposes it as `/dev/mapper/<name>`. Switching the
//! device between passthrough and dropping or failing writes lets a test cut
//! power at a chosen point and check what the filesystem kept.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dmflakey::prelude::*;
//!
//! let mut flakey = Flakey::init("t1", "/var/tmp", FsType::Ext4)?;
//! flakey.drop_writes(FeatureOptions::new())?;
//! flakey.allow_writes(FeatureOptions::new())?;
//! flakey.teardown()?;
//! # Ok::<(), dmflakey::core::Error>(())
//! ```

pub use flakey_core as core;
pub use flakey_dm as dm;
pub use flakey_platform as platform;
pub use flakey_test as harness;

/// Prelude module for common imports.
pub mod prelude {
    pub use flakey_core::{
        Direction, Error, FaultMode, FeatureOptions, FlakeyConfig, FlakeyTable, FsType,
        UnmountPolicy,
    };
    pub use flakey_dm::{DeviceState, FaultInjector, Flakey};
    pub use flakey_test::{
        FlakeyFixture, MountSpec, TestError, Workload, simulate_power_failure, skip_reason,
    };
}
