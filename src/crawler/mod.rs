//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The breadth-first frontier and per-host pacing
//! - The fetch strategy chain with retry and backoff
//! - HTML parsing and link/document extraction
//! - Overall crawl coordination

mod coordinator;
pub mod extractor;
pub mod fetcher;
mod frontier;
pub mod parser;
pub mod retry;
mod scheduler;
pub mod webdriver;

pub use coordinator::{run_crawl, Coordinator};
pub use extractor::{Extraction, Extractor, LinkNature};
pub use fetcher::{
    build_browser_client, build_http_client, FetchError, FetchResult, FetchStrategy, Fetcher,
    HttpStrategy, PageBody, StrategyError, StrategyFailure, StrategyKind,
};
pub use frontier::{EnqueueOutcome, Frontier};
pub use parser::{parse_html, resolve_link, LinkOrigin, LinkRef, ParsedPage};
pub use retry::{FailureKind, RetryDecision, RetryPolicy};
pub use scheduler::{HostPacer, HostTurn};
pub use webdriver::WebDriverStrategy;
