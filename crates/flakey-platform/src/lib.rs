// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # flakey-platform
//!
//! Linux host capabilities a flakey controller is built from:
//!
//! - [`image`]: create and format a backing image (`mkfs.<type>`)
//! - [`loopdev`]: bind an image to a loop device and read its size
//! - [`dmsetup`]: create, reload, remove and inspect device-mapper devices
//! - [`mount`]: mount, and unmount with bounded busy-retry
//! - [`sync`]: `syncfs(2)`
//!
//! Almost everything here needs root (or `CAP_SYS_ADMIN`) and the loop and
//! dm-flakey kernel modules.

#![warn(missing_docs)]

#[cfg(not(target_os = "linux"))]
compile_error!("flakey-platform only supports Linux");

pub mod command;
pub mod dmsetup;
pub mod image;
pub mod loopdev;
pub mod mount;
pub mod sync;
pub mod sys;

pub use image::{create_image, remove_image};
pub use loopdev::LoopDevice;
pub use mount::{unmount, unmount_all};
pub use sync::syncfs;
