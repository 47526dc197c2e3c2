//! Acquire/release bookkeeping.
//!
//! Every resource a controller acquires is pushed on a [`ResourceStack`];
//! release pops them in reverse. A release that fails leaves its resource on
//! the stack so the next unwind resumes from the same place.

use std::fmt;
use std::path::PathBuf;

use flakey_core::Result;

/// Something a controller holds and must give back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Backing image file.
    Image(PathBuf),
    /// Loop device bound to the image.
    LoopDevice(PathBuf),
    /// The flakey device-mapper device.
    FlakeyDevice(String),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(path) => write!(f, "image {}", path.display()),
            Self::LoopDevice(path) => write!(f, "loop device {}", path.display()),
            Self::FlakeyDevice(name) => write!(f, "flakey device {name}"),
        }
    }
}

/// LIFO stack of held resources.
#[derive(Debug, Default)]
pub struct ResourceStack {
    held: Vec<Resource>,
}

impl ResourceStack {
    /// Empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { held: Vec::new() }
    }

    /// Records an acquired resource.
    pub fn push(&mut self, resource: Resource) {
        tracing::debug!("acquired {resource}");
        self.held.push(resource);
    }

    /// Resources still held, oldest first.
    #[must_use]
    pub fn held(&self) -> &[Resource] {
        &self.held
    }

    /// Number of resources still held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// True once everything has been released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Releases everything, newest first.
    ///
    /// `release` returns `Ok(false)` for a resource that was already gone;
    /// that is logged and skipped. The first error stops the unwind with the
    /// failing resource still on the stack.
    pub fn unwind<F>(&mut self, mut release: F) -> Result<()>
    where
        F: FnMut(&Resource) -> Result<bool>,
    {
        while let Some(resource) = self.held.pop() {
            match release(&resource) {
                Ok(true) => tracing::debug!("released {resource}"),
                Ok(false) => tracing::warn!("{resource} was already gone"),
                Err(e) => {
                    tracing::warn!("failed to release {resource}: {e}");
                    self.held.push(resource);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
