//! Point-in-time engine snapshots.

use std::sync::Arc;

/// A serialized snapshot of the engine plus the tick it was taken at.
///
/// Bookmarks hang off `Checkpoint` history events. Seeking restores the engine
/// directly from the blob, so the cost of a seek is bounded by the distance to
/// the nearest bookmark rather than by the length of the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    /// Engine tick count when the snapshot was taken.
    pub ticks: u64,
    /// Opaque engine state, as produced by `Engine::get_state`.
    pub state: Arc<[u8]>,
    /// `true` when created automatically on machine close.
    pub system: bool,
}

impl Bookmark {
    /// Create a bookmark, copying the state blob.
    pub fn new(ticks: u64, state: &[u8], system: bool) -> Self {
        Self {
            ticks,
            state: Arc::from(state),
            system,
        }
    }

    /// Create a bookmark that takes ownership of an existing blob.
    pub fn from_vec(ticks: u64, state: Vec<u8>, system: bool) -> Self {
        Self {
            ticks,
            state: state.into(),
            system,
        }
    }

    /// Size of the state blob in bytes.
    pub fn state_len(&self) -> usize {
        self.state.len()
    }
}
