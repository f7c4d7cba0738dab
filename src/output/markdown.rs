//! Markdown summary generation
//!
//! A human-readable companion to the JSON report: run information, totals,
//! documents per category and the failure list.

use crate::output::traits::{OutputHandler, OutputResult};
use crate::output::CrawlReport;
use std::fs;
use std::path::PathBuf;

/// Most failures listed individually in the summary
const MAX_LISTED_FAILURES: usize = 100;

/// Writes a markdown summary file
pub struct MarkdownSummary {
    path: PathBuf,
}

impl MarkdownSummary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputHandler for MarkdownSummary {
    fn name(&self) -> &'static str {
        "markdown summary"
    }

    fn write_report(&self, report: &CrawlReport) -> OutputResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format_markdown_summary(report))?;
        Ok(())
    }
}

/// Formats a crawl report as markdown
///
/// # Arguments
///
/// * `report` - The final report of a crawl run
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_summary(report: &CrawlReport) -> String {
    let totals = &report.totals;
    let mut md = String::new();

    md.push_str("# Doc-Harvester Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Status**: {}\n", report.status));
    md.push_str(&format!("- **Crawl Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Run Started**: {}\n", report.run_started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
        report.elapsed_secs,
        report.elapsed_secs / 60.0
    ));
    md.push_str(&format!("- **Max Depth**: {}\n", report.max_depth));
    md.push_str(&format!("- **Seeds**: {}\n\n", report.seeds.len()));

    md.push_str("## Totals\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Pages processed | {} |\n", totals.pages_processed));
    md.push_str(&format!("| Pages fetched | {} |\n", totals.pages_fetched));
    md.push_str(&format!("| Pages failed | {} |\n", totals.pages_failed));
    md.push_str(&format!("| Pages abandoned | {} |\n", totals.pages_abandoned));
    md.push_str(&format!("| Pages pending | {} |\n", totals.pages_pending));
    md.push_str(&format!("| Documents stored | {} |\n", totals.documents_stored));
    md.push_str(&format!("| Duplicate documents | {} |\n", totals.documents_duplicate));
    md.push_str(&format!("| Bytes stored | {} |\n", totals.bytes_stored));
    md.push_str(&format!("| Failures | {} |\n\n", totals.failures));

    if !totals.categories.is_empty() {
        md.push_str("## Documents by Category\n\n");
        md.push_str("| Category | Documents |\n");
        md.push_str("|----------|-----------|\n");
        for (category, count) in &totals.categories {
            md.push_str(&format!("| {} | {} |\n", category, count));
        }
        md.push('\n');
    }

    if !report.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| Stage | URL | Error |\n");
        md.push_str("|-------|-----|-------|\n");
        for failure in report.failures.iter().take(MAX_LISTED_FAILURES) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                failure.stage,
                failure.url,
                escape_cell(&failure.error)
            ));
        }
        if report.failures.len() > MAX_LISTED_FAILURES {
            md.push_str(&format!(
                "\n...and {} more (see the JSON report)\n",
                report.failures.len() - MAX_LISTED_FAILURES
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
