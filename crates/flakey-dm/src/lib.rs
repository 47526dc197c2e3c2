// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # flakey-dm
//!
//! Device lifecycle and the [`Flakey`] controller.
//!
//! A controller owns three resources, acquired in order and released in
//! reverse:
//!
//! 1. a backing image formatted with `mkfs.<type>`
//! 2. a loop device bound to the image
//! 3. a `flakey` device-mapper device over the loop device
//!
//! Mode transitions ([`FaultInjector`]) swap the flakey table in place; the
//! mounted filesystem keeps using `/dev/mapper/<name>` throughout.
//!
//! Host access goes through the [`Backend`] trait so the acquire/release and
//! state-machine logic can be exercised without root.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod flakey;
pub mod injector;
pub mod lifecycle;
pub mod resources;

pub use backend::{Backend, LinuxBackend};
pub use flakey::Flakey;
pub use injector::FaultInjector;
pub use lifecycle::{DeviceLifecycle, DeviceState, SyncRequest};
pub use resources::{Resource, ResourceStack};

#[cfg(test)]
pub mod tests;
