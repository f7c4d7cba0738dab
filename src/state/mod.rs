//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageStatus`: terminal outcome of a processed page
//! - `HostState`: per-host request pacing
//! - `CrawlLedger`: page outcomes and per-item failures, carried across resumed runs
//! - `WorkItem`: a queued page and its depth

mod domain_state;
mod ledger;
mod page_state;
mod work_item;

pub use domain_state::HostState;
pub use ledger::{CrawlLedger, FailureRecord, FailureStage, PageRecord};
pub use page_state::PageStatus;
pub use work_item::WorkItem;
