//! Final crawl report
//!
//! Built from the last progress snapshot so the report and the resumable
//! state always agree.

use crate::document::DownloadedDocument;
use crate::output::traits::{OutputHandler, OutputResult};
use crate::state::{FailureRecord, PageRecord, PageStatus};
use crate::storage::ProgressSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// How a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The queue was exhausted and nothing failed
    Completed,

    /// The queue was exhausted but per-URL failures were recorded
    CompletedWithFailures,

    /// Cancelled or stopped by the page budget; resumable
    Interrupted,
}

impl RunStatus {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::CompletedWithFailures => 3,
            Self::Interrupted => 4,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithFailures => "completed_with_failures",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "completed_with_failures" => Some(Self::CompletedWithFailures),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Aggregate counts over the whole crawl
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub pages_processed: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub pages_abandoned: usize,
    pub pages_pending: usize,
    pub urls_visited: usize,
    pub documents_stored: usize,
    pub documents_duplicate: usize,
    pub bytes_stored: u64,
    pub failures: usize,
    pub failures_by_stage: BTreeMap<String, usize>,
    /// Stored documents per category
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub status: RunStatus,
    /// When the crawl first started, across resumes
    pub started_at: DateTime<Utc>,
    /// When this run started
    pub run_started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall time of this run
    pub elapsed_secs: f64,
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub pages: Vec<PageRecord>,
    pub documents: Vec<DownloadedDocument>,
    pub failures: Vec<FailureRecord>,
    pub totals: ReportTotals,
}

impl CrawlReport {
    /// Builds the report from the final snapshot of a run
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Progress as flushed at the end of the run
    /// * `status` - How the run ended
    /// * `run_started_at` - When this run (not the whole crawl) began
    pub fn from_snapshot(
        snapshot: &ProgressSnapshot,
        status: RunStatus,
        run_started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let ledger = &snapshot.ledger;

        let count_pages = |status: PageStatus| ledger.pages.iter().filter(|p| p.status == status).count();

        let mut failures_by_stage = BTreeMap::new();
        for failure in &ledger.failures {
            *failures_by_stage.entry(failure.stage.to_string()).or_insert(0) += 1;
        }

        let mut categories = BTreeMap::new();
        let mut bytes_stored = 0;
        for doc in snapshot.stored_documents() {
            *categories.entry(doc.category.clone()).or_insert(0) += 1;
            bytes_stored += doc.size_bytes;
        }
        let documents_stored = snapshot.stored_documents().count();

        let totals = ReportTotals {
            pages_processed: ledger.pages.len(),
            pages_fetched: count_pages(PageStatus::Fetched),
            pages_failed: count_pages(PageStatus::Failed),
            pages_abandoned: count_pages(PageStatus::Abandoned),
            pages_pending: snapshot.pending.len(),
            urls_visited: snapshot.visited.len(),
            documents_stored,
            documents_duplicate: snapshot.downloaded.len() - documents_stored,
            bytes_stored,
            failures: ledger.failures.len(),
            failures_by_stage,
            categories,
        };

        Self {
            status,
            started_at: snapshot.started_at,
            run_started_at,
            finished_at,
            elapsed_secs: (finished_at - run_started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            seeds: snapshot.seeds.clone(),
            max_depth: snapshot.max_depth,
            pages: ledger.pages.clone(),
            documents: snapshot.downloaded.clone(),
            failures: ledger.failures.clone(),
            totals,
        }
    }

    /// Writes the report as pretty JSON, replacing any earlier report atomically
    pub fn write_json(&self, path: &Path) -> OutputResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;

        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> OutputResult<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Writes the JSON report file
pub struct JsonReportWriter {
    path: PathBuf,
}

impl JsonReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputHandler for JsonReportWriter {
    fn name(&self) -> &'static str {
        "json report"
    }

    fn write_report(&self, report: &CrawlReport) -> OutputResult<()> {
        report.write_json(&self.path)
    }
}
