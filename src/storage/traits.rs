//! Progress store trait and error types

use crate::state::WorkItem;
use crate::storage::ProgressSnapshot;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reading or writing the progress snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Progress snapshot {path} is corrupt ({message}); rerun without --resume to start a clean crawl"
    )]
    Corrupt { path: PathBuf, message: String },

    #[error("Snapshot version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Durable home of the crawl's progress
///
/// Implementations must make `save` atomic from a reader's point of view:
/// a concurrent or later `load` sees either the previous snapshot or the new
/// one, never a partial write. Saves are serialized.
///
/// The item currently being processed is recorded separately through
/// `mark_in_flight`, which is cheap enough to call for every item while full
/// snapshots are batched.
pub trait ProgressStore: Send + Sync {
    /// Loads the last saved snapshot; `Ok(None)` when nothing was saved yet
    ///
    /// An item recorded by `mark_in_flight` is reported in the snapshot's
    /// `in_flight` list unless the snapshot already counts it as processed.
    fn load(&self) -> SnapshotResult<Option<ProgressSnapshot>>;

    /// Replaces the stored snapshot
    fn save(&self, snapshot: &ProgressSnapshot) -> SnapshotResult<()>;

    /// Records the item being processed right now; `None` clears the record
    fn mark_in_flight(&self, item: Option<&WorkItem>) -> SnapshotResult<()>;
}
