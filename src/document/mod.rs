//! Document model shared by the extractor, categorizer and downloader
//!
//! - `DocumentKind`: the supported formats and their MIME/signature rules
//! - `DocumentCandidate`: a URL suspected to be a document, not yet fetched
//! - `DownloadedDocument`: a stored (or deduplicated) document record
//! - `DocumentIndex`: checksum lookup used for content deduplication

mod kind;

pub use kind::{url_extension, DocumentKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How a document candidate was recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// A known document extension in the URL path, or an explicit download attribute
    Extension,
    /// The resource was served with a document Content-Type
    ContentType,
    /// The external classifier judged an ambiguous link to be a document
    Ai,
    /// A URL found by scanning inline script text
    JavascriptExtraction,
}

/// A URL suspected to reference a downloadable document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCandidate {
    /// Normalized absolute URL
    pub url: String,
    pub inferred_type: DocumentKind,
    pub detection_source: DetectionSource,
    /// Confidence in [0, 1] that this is a document
    pub confidence: f32,
    /// Category suggested by the classifier while judging the link, if any
    #[serde(default)]
    pub suggested_category: Option<String>,
    /// Link text or nearby words, reused as categorization context
    #[serde(default)]
    pub context: String,
    /// Page on which the link was found
    #[serde(default)]
    pub found_on: Option<String>,
}

impl DocumentCandidate {
    pub fn new(
        url: impl Into<String>,
        inferred_type: DocumentKind,
        detection_source: DetectionSource,
        confidence: f32,
    ) -> Self {
        Self {
            url: url.into(),
            inferred_type,
            detection_source,
            confidence: confidence.clamp(0.0, 1.0),
            suggested_category: None,
            context: String::new(),
            found_on: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_found_on(mut self, page: impl Into<String>) -> Self {
        self.found_on = Some(page.into());
        self
    }

    pub fn with_suggested_category(mut self, category: Option<String>) -> Self {
        self.suggested_category = category;
        self
    }
}

/// A document retrieved into storage
///
/// When `duplicate_of` is set, no bytes were written for this record: its
/// content matched an earlier download and `local_path` points at that
/// artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedDocument {
    pub source_url: String,
    pub local_path: PathBuf,
    pub category: String,
    pub confidence: f32,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content
    pub checksum: String,
    pub timestamp: DateTime<Utc>,
    /// Attempts beyond the first that were needed
    pub retry_count: u32,
    pub kind: DocumentKind,
    #[serde(default)]
    pub duplicate_of: Option<String>,
    #[serde(default)]
    pub found_on: Option<String>,
}

impl DownloadedDocument {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// Checksum index over stored documents
///
/// Only records that own their bytes are indexed, so a lookup always yields
/// the original artifact.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    by_checksum: HashMap<String, DownloadedDocument>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from previously recorded downloads
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DownloadedDocument>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.insert(record);
        }
        index
    }

    pub fn get(&self, checksum: &str) -> Option<&DownloadedDocument> {
        self.by_checksum.get(checksum)
    }

    /// Indexes a record; duplicates and already-indexed checksums are ignored
    pub fn insert(&mut self, record: &DownloadedDocument) {
        if record.is_duplicate() {
            return;
        }
        self.by_checksum
            .entry(record.checksum.clone())
            .or_insert_with(|| record.clone());
    }

    pub fn len(&self) -> usize {
        self.by_checksum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_checksum.is_empty()
    }
}
