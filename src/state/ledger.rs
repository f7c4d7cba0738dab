use crate::state::PageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Crawl stage at which a per-item failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Extract,
    Classification,
    Download,
    /// Item left in flight by an interrupted run
    Resume,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Classification => "classification",
            Self::Download => "download",
            Self::Resume => "resume",
        };
        f.write_str(s)
    }
}

/// One recorded failure, detailed enough to re-run just the failed subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub stage: FailureStage,
    pub error: String,
    /// Page on which the failed URL was found, if it was not a seed
    pub origin: Option<String>,
    pub at: DateTime<Utc>,
}

/// Outcome of one processed page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub depth: u32,
    pub status: PageStatus,
    /// Which fetch strategy produced the content
    pub strategy: Option<String>,
    pub links_enqueued: usize,
    /// URLs of document candidates found on the page
    pub documents_found: Vec<String>,
    pub at: DateTime<Utc>,
}

/// Running record of page outcomes and failures across runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlLedger {
    pub pages: Vec<PageRecord>,
    pub failures: Vec<FailureRecord>,
}

impl CrawlLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_page(&mut self, page: PageRecord) {
        self.pages.push(page);
    }

    pub fn record_failure(
        &mut self,
        url: impl Into<String>,
        stage: FailureStage,
        error: impl fmt::Display,
        origin: Option<String>,
    ) {
        let url = url.into();
        let error = error.to_string();
        tracing::warn!("{} failure for {}: {}", stage, url, error);
        self.failures.push(FailureRecord {
            url,
            stage,
            error,
            origin,
            at: Utc::now(),
        });
    }

    pub fn failures_at(&self, stage: FailureStage) -> usize {
        self.failures.iter().filter(|f| f.stage == stage).count()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure_counts_by_stage() {
        let mut ledger = CrawlLedger::new();
        ledger.record_failure("https://a.com/x", FailureStage::Fetch, "timeout", None);
        ledger.record_failure(
            "https://a.com/y.pdf",
            FailureStage::Download,
            "HTTP 404",
            Some("https://a.com/".to_string()),
        );
        ledger.record_failure("https://a.com/z", FailureStage::Fetch, "HTTP 500", None);

        assert!(ledger.has_failures());
        assert_eq!(ledger.failures_at(FailureStage::Fetch), 2);
        assert_eq!(ledger.failures_at(FailureStage::Download), 1);
        assert_eq!(ledger.failures_at(FailureStage::Resume), 0);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&FailureStage::Classification).unwrap();
        assert_eq!(json, "\"classification\"");
        assert_eq!(FailureStage::Resume.to_string(), "resume");
    }
}
