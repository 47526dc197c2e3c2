//! Device lifecycle state machine.
//!
//! ```text
//! Uninitialized --create--> Active --remove--> Removed
//!                           |    ^
//!                           +----+ reload
//! ```
//!
//! Reload is the only way the device changes while active, and it always
//! replaces the whole table.

use std::fmt;
use std::path::Path;

use flakey_core::{Error, FlakeyTable, Result};

use crate::backend::Backend;

/// Lifecycle state of one device-mapper device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Not created yet.
    Uninitialized,
    /// Created; a table is loaded.
    Active,
    /// Removed (or found already gone).
    Removed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Active => "active",
            Self::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Flush to perform before a table swap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncRequest<'a> {
    /// Flush the filesystem before swapping.
    pub flush: bool,
    /// File or mount point whose filesystem is `syncfs`ed first.
    pub target: Option<&'a Path>,
}

impl<'a> SyncRequest<'a> {
    /// No flush.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            flush: false,
            target: None,
        }
    }

    /// Flush, syncing `target` first when given.
    #[must_use]
    pub const fn flush(target: Option<&'a Path>) -> Self {
        Self {
            flush: true,
            target,
        }
    }
}

/// Tracks one flakey device through its lifecycle.
#[derive(Debug)]
pub struct DeviceLifecycle {
    name: String,
    state: DeviceState,
    table: Option<FlakeyTable>,
}

impl DeviceLifecycle {
    /// A device that has not been created yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: DeviceState::Uninitialized,
            table: None,
        }
    }

    /// Device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> DeviceState {
        self.state
    }

    /// Table most recently loaded by this controller.
    #[must_use]
    pub const fn table(&self) -> Option<&FlakeyTable> {
        self.table.as_ref()
    }

    /// Creates the device with its initial table.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] unless the device is uninitialized
    /// - [`Error::AlreadyExists`] if the name is taken
    /// - the kernel's rejection of the table, verbatim
    pub fn create<B: Backend + ?Sized>(&mut self, backend: &B, table: FlakeyTable) -> Result<()> {
        self.expect_state(DeviceState::Uninitialized, "create")?;
        backend.create_device(&self.name, &table)?;
        self.state = DeviceState::Active;
        self.table = Some(table);
        Ok(())
    }

    /// Swaps in `table`.
    ///
    /// When `sync.flush` is set the filesystem is flushed before the swap:
    /// writes issued under the old mode must reach the device under the old
    /// mode.
    pub fn reload<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        table: FlakeyTable,
        sync: SyncRequest<'_>,
    ) -> Result<()> {
        self.expect_state(DeviceState::Active, "reload")?;
        if sync.flush {
            if let Some(target) = sync.target {
                backend.syncfs(target)?;
            }
        }
        backend.reload_device(&self.name, &table, sync.flush)?;
        self.table = Some(table);
        Ok(())
    }

    /// Removes the device.
    ///
    /// Idempotent: returns `Ok(false)` if there was nothing to remove,
    /// including when the device vanished behind our back.
    pub fn remove<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<bool> {
        match self.state {
            DeviceState::Uninitialized | DeviceState::Removed => Ok(false),
            DeviceState::Active => {
                let removed = backend.remove_device(&self.name)?;
                if !removed {
                    tracing::warn!("device {} was already removed", self.name);
                }
                self.state = DeviceState::Removed;
                Ok(removed)
            }
        }
    }

    /// Reads the table the kernel currently has loaded.
    pub fn live_table<B: Backend + ?Sized>(&self, backend: &B) -> Result<FlakeyTable> {
        self.expect_state(DeviceState::Active, "read table of")?;
        backend.device_table(&self.name)
    }

    fn expect_state(&self, expected: DeviceState, op: &str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(Error::invalid_state(format!(
            "cannot {op} device {} while {}",
            self.name, self.state
        )))
    }
}
