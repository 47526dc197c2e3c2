//! Controller tests against a recording mock backend.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `lifecycle` | device state machine, `init` acquire/unwind, mode transitions |
//! | `teardown` | reverse release, idempotence, resume after failure, `Drop` |

#![allow(missing_docs)]


use flakey_core::{FlakeyConfig, FsType, Result};

use crate::Flakey;
use mocks::MockBackend;

/// Store directory used by every mock controller; the mock never touches it.
pub const STORE: &str = "/store";

/// Initializes an ext4 controller named `name` on a clone of `backend`.
pub fn init(backend: &MockBackend, name: &str) -> Result<Flakey<MockBackend>> {
    init_fs(backend, name, FsType::Ext4)
}

pub fn init_fs(backend: &MockBackend, name: &str, fs_type: FsType) -> Result<Flakey<MockBackend>> {
    Flakey::init_with(
        backend.clone(),
        name,
        STORE,
        fs_type,
        &FlakeyConfig::default(),
    )
}
