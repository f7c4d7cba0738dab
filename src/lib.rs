//! Doc-Harvester: a document crawl-and-download engine
//!
//! This crate walks outward from a set of seed URLs, breadth-first and
//! bounded by depth, decides for every link whether it is a page worth
//! following or a document worth keeping, and downloads the documents into a
//! category-organized tree with checksum deduplication and resumable progress.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod document;
pub mod download;
pub mod input;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fatal harvester failures
///
/// Per-item failures (fetch, download, classification) never surface here;
/// they are recorded in the crawl ledger and the run continues.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] storage::SnapshotError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl HarvestError {
    /// Process exit code for a fatal error
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid seed input {}: {message}", path.display())]
    Input { path: PathBuf, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Coordinator};
pub use document::{DetectionSource, DocumentCandidate, DocumentKind, DownloadedDocument};
pub use output::{CrawlReport, RunStatus};
pub use url::{extract_domain, normalize_url};
