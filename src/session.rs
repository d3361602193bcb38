use std::path::Path;

use crate::backend::{open_default_backend, DocumentBackend};
use crate::error::AppResult;
use crate::geometry::Rotation;

/// Immutable view of the session's display parameters, captured when an
/// epoch is scheduled so workers never read live mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub rotation: Rotation,
    pub dark_mode: bool,
}

/// Owns the opened document handle and its epoch-relevant mutable state.
///
/// Rotation and theme changes bump the epoch; zoom never goes through the
/// session since it is a pure presentation-layer resize.
pub struct DocumentSession {
    backend: Box<dyn DocumentBackend>,
    rotation: Rotation,
    dark_mode: bool,
    epoch: u64,
}

impl DocumentSession {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self::from_backend(open_default_backend(path)?))
    }

    /// Starts a session at epoch 0 with no rotation and light theme.
    pub fn from_backend(backend: Box<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            rotation: Rotation::Deg0,
            dark_mode: false,
            epoch: 0,
        }
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    pub fn doc_id(&self) -> u64 {
        self.backend.doc_id()
    }

    pub fn page_count(&self) -> usize {
        self.backend.page_count()
    }

    pub fn backend(&self) -> &dyn DocumentBackend {
        self.backend.as_ref()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }

    /// Rotates the whole document and starts a new epoch. State is updated
    /// before the bump so jobs scheduled afterwards see a consistent pair.
    pub fn rotate_by(&mut self, quarter_turns: i32) -> u64 {
        self.rotation = self.rotation.rotated_by(quarter_turns);
        self.bump_epoch()
    }

    /// Flips the theme and starts a new epoch; cached bitmaps of the old
    /// epoch are no longer displayable since pixel content changes.
    pub fn toggle_dark_mode(&mut self) -> u64 {
        self.dark_mode = !self.dark_mode;
        self.bump_epoch()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            epoch: self.epoch,
            rotation: self.rotation,
            dark_mode: self.dark_mode,
        }
    }

    fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }
}
