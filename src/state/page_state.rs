//! Outcome of processing one work item
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of a page in the crawl ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Content was fetched and links extracted
    Fetched,

    /// Every fetch strategy was exhausted
    Failed,

    /// The item was in flight when a previous run stopped and is skipped on resume
    Abandoned,
}

impl PageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched)
    }

    /// Converts the status to its stored string form
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    /// Parses a status from its stored string form
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "fetched" => Some(Self::Fetched),
            "failed" => Some(Self::Failed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
