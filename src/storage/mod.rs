//! Storage module for persisting crawl progress
//!
//! This module handles the durable progress snapshot used for resumption:
//! - The snapshot format (`ProgressSnapshot`)
//! - The store interface (`ProgressStore`)
//! - An atomic JSON file implementation (`JsonFileStore`)

mod json_file;
mod traits;

pub use json_file::JsonFileStore;
pub use traits::{ProgressStore, SnapshotError, SnapshotResult};

use crate::document::DownloadedDocument;
use crate::state::{CrawlLedger, WorkItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Opens the snapshot store at a path
///
/// # Arguments
///
/// * `path` - Path to the snapshot file (created on first save)
pub fn open_store(path: &Path) -> JsonFileStore {
    JsonFileStore::new(path)
}

/// Everything needed to resume a crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// When the crawl first started (preserved across resumes)
    pub started_at: DateTime<Utc>,
    pub max_depth: u32,
    pub seeds: Vec<String>,
    /// URLs ever enqueued, sorted
    pub visited: Vec<String>,
    /// URLs whose processing finished, sorted
    pub processed: Vec<String>,
    /// Queue contents in order
    pub pending: Vec<WorkItem>,
    /// Items being processed when the snapshot was taken
    #[serde(default)]
    pub in_flight: Vec<WorkItem>,
    pub downloaded: Vec<DownloadedDocument>,
    #[serde(default)]
    pub ledger: CrawlLedger,
}

impl ProgressSnapshot {
    /// Documents that own stored bytes
    pub fn stored_documents(&self) -> impl Iterator<Item = &DownloadedDocument> {
        self.downloaded.iter().filter(|d| !d.is_duplicate())
    }
}
