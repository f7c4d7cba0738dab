//! Output module for crawl reports
//!
//! This module handles:
//! - The final JSON report (always written)
//! - An optional markdown summary
//! - An optional SQLite catalog of documents, pages and failures
//! - Statistics read back from the progress snapshot

mod markdown;
mod report;
mod sqlite_output;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_summary, MarkdownSummary};
pub use report::{CrawlReport, JsonReportWriter, ReportTotals, RunStatus};
pub use sqlite_output::{open_catalog, SqliteCatalog};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{OutputError, OutputHandler, OutputResult};

use crate::config::OutputConfig;

/// Builds the output handlers selected by the configuration
///
/// The JSON report is always first; the summary and catalog follow when
/// their paths are configured.
pub fn handlers_for(config: &OutputConfig) -> Vec<Box<dyn OutputHandler>> {
    let mut handlers: Vec<Box<dyn OutputHandler>> =
        vec![Box::new(JsonReportWriter::new(config.report_path()))];
    if let Some(path) = &config.summary_path {
        handlers.push(Box::new(MarkdownSummary::new(path)));
    }
    if let Some(path) = &config.catalog_path {
        handlers.push(Box::new(SqliteCatalog::new(path)));
    }
    handlers
}

/// Writes a report through every configured handler
///
/// # Arguments
///
/// * `report` - The final report of a crawl run
/// * `config` - Where the outputs go
///
/// # Returns
///
/// * `Ok(())` - Every output was written
/// * `Err(OutputError)` - The first output that failed
pub fn write_outputs(report: &CrawlReport, config: &OutputConfig) -> OutputResult<()> {
    for handler in handlers_for(config) {
        handler.write_report(report)?;
        tracing::debug!("Wrote {}", handler.name());
    }
    Ok(())
}
