//! Output handler trait and error types
//!
//! An output handler renders a finished [`CrawlReport`] somewhere: the JSON
//! report file, a markdown summary, or a SQLite catalog.

use crate::output::CrawlReport;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Trait for output handlers
pub trait OutputHandler {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Writes the report
    ///
    /// # Arguments
    ///
    /// * `report` - The final report of a crawl run
    fn write_report(&self, report: &CrawlReport) -> OutputResult<()>;
}
