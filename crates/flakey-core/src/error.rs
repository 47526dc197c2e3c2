//! Error types for flakey-core.
//!
//! One taxonomy is shared by every crate in the workspace so that a failure
//! deep inside a tool invocation reaches the test driver with its context
//! (operation, target, tool output) intact.

/// Result type alias for flakey operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while provisioning, driving or tearing down a flakey device.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem type is not one of the supported kinds.
    #[error("unsupported filesystem: {0}")]
    UnsupportedFilesystem(String),

    /// Invalid name, size, interval or other configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Table line could not be built or parsed.
    #[error("malformed table: {0}")]
    MalformedTable(String),

    /// Every loop device is in use.
    #[error("no free loop device available: {0}")]
    NoFreeLoopDevice(std::io::Error),

    /// Resource already exists (image file, device-mapper device).
    #[error("{what} already exists: {target}")]
    AlreadyExists {
        /// Kind of resource
        what: &'static str,
        /// Path or name of the resource
        target: String,
    },

    /// Resource does not exist.
    #[error("{what} not found: {target}")]
    NotFound {
        /// Kind of resource
        what: &'static str,
        /// Path or name of the resource
        target: String,
    },

    /// Target stayed busy for the whole retry budget.
    #[error("{target} is still busy after {attempts} attempts")]
    Busy {
        /// Path that stayed busy
        target: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Fault mode declared but without a table encoding.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// External tool could not be found on PATH.
    #[error("{0} not found (is it installed and on PATH?)")]
    ToolNotFound(String),

    /// External tool exited unsuccessfully.
    #[error("failed to {op} {target} ({status}) (out: {output})")]
    Command {
        /// Operation being attempted
        op: String,
        /// Path or name the operation targeted
        target: String,
        /// Exit status description
        status: String,
        /// Combined stdout and stderr of the tool
        output: String,
    },

    /// Syscall or filesystem operation failed.
    #[error("failed to {op} {target}: {source}")]
    Io {
        /// Operation being attempted
        op: &'static str,
        /// Path the operation targeted
        target: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Operation not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a malformed table error.
    #[must_use]
    pub fn malformed_table(msg: impl Into<String>) -> Self {
        Self::MalformedTable(msg.into())
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Wraps an I/O error with the operation and target it came from.
    #[must_use]
    pub fn io(op: &'static str, target: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            op,
            target: target.to_string(),
            source,
        }
    }

    /// Returns the raw OS error number, if this error carries one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } | Self::NoFreeLoopDevice(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// Check if this error is a configuration error (raised before any
    /// resource is allocated).
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFilesystem(_) | Self::Config(_) | Self::MalformedTable(_)
        )
    }

    /// Check if this error indicates the resource was not found
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
                    || source.raw_os_error() == Some(libc_enxio())
            }
            _ => false,
        }
    }

    /// Check if this error indicates a busy resource
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Busy { .. } => true,
            Self::Io { source, .. } => source.raw_os_error() == Some(libc_ebusy()),
            _ => false,
        }
    }

    /// Check if this error marks an unimplemented fault mode
    #[must_use]
    pub const fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

// Stable Linux errno values; flakey-core stays free of libc.
const fn libc_enxio() -> i32 {
    6
}

const fn libc_ebusy() -> i32 {
    16
}
