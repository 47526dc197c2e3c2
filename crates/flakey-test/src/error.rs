//! Test error types.

use std::fmt;
use std::time::Duration;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Step of a simulated power failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Switching the device to drop writes.
    DropWrites,
    /// Unmounting the filesystem.
    Unmount,
    /// Switching the device back to passthrough.
    AllowWrites,
    /// Remounting the filesystem.
    Mount,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DropWrites => "drop_writes",
            Self::Unmount => "unmount",
            Self::AllowWrites => "allow_writes",
            Self::Mount => "mount",
        };
        f.write_str(s)
    }
}

/// Harness errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// A power-failure stage failed.
    #[error("power failure: {stage} failed: {source}")]
    Stage {
        /// Stage that failed
        stage: Stage,
        /// Underlying error
        #[source]
        source: flakey_core::Error,
    },

    /// Fixture setup or cleanup error.
    #[error("harness error: {0}")]
    Harness(String),

    /// Workload process error.
    #[error("workload error: {0}")]
    Workload(String),

    /// Timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Controller error.
    #[error("flakey error: {0}")]
    Flakey(#[from] flakey_core::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TestError {
    /// Wraps `source` with the power-failure stage it came from.
    #[must_use]
    pub const fn stage(stage: Stage, source: flakey_core::Error) -> Self {
        Self::Stage { stage, source }
    }

    /// Creates a harness error.
    #[must_use]
    pub fn harness(msg: impl Into<String>) -> Self {
        Self::Harness(msg.into())
    }

    /// Creates a workload error.
    #[must_use]
    pub fn workload(msg: impl Into<String>) -> Self {
        Self::Workload(msg.into())
    }

    /// Stage a power-failure error came from, if any.
    #[must_use]
    pub const fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
