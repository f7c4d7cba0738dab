//! Statistics from the progress snapshot
//!
//! Backs the `--stats` flag: reads the snapshot without starting a crawl.

use crate::state::FailureStage;
use crate::storage::{ProgressSnapshot, ProgressStore, SnapshotResult};
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    pub max_depth: u32,
    pub seeds: usize,
    pub visited: usize,
    pub processed: usize,
    pub pending: usize,
    /// Pending items per depth
    pub pending_by_depth: BTreeMap<u32, usize>,
    pub in_flight: usize,
    pub documents_stored: usize,
    pub documents_duplicate: usize,
    pub bytes_stored: u64,
    pub categories: BTreeMap<String, usize>,
    pub failures_by_stage: BTreeMap<FailureStage, usize>,
}

impl CrawlStatistics {
    pub fn from_snapshot(snapshot: &ProgressSnapshot) -> Self {
        let mut pending_by_depth = BTreeMap::new();
        for item in &snapshot.pending {
            *pending_by_depth.entry(item.depth).or_insert(0) += 1;
        }

        let mut categories = BTreeMap::new();
        let mut bytes_stored = 0;
        for doc in snapshot.stored_documents() {
            *categories.entry(doc.category.clone()).or_insert(0) += 1;
            bytes_stored += doc.size_bytes;
        }
        let documents_stored = snapshot.stored_documents().count();

        let mut failures_by_stage = BTreeMap::new();
        for failure in &snapshot.ledger.failures {
            *failures_by_stage.entry(failure.stage).or_insert(0) += 1;
        }

        Self {
            max_depth: snapshot.max_depth,
            seeds: snapshot.seeds.len(),
            visited: snapshot.visited.len(),
            processed: snapshot.processed.len(),
            pending: snapshot.pending.len(),
            pending_by_depth,
            in_flight: snapshot.in_flight.len(),
            documents_stored,
            documents_duplicate: snapshot.downloaded.len() - documents_stored,
            bytes_stored,
            categories,
            failures_by_stage,
        }
    }
}

/// Loads statistics from the progress store
///
/// # Returns
///
/// * `Ok(Some(CrawlStatistics))` - A snapshot exists
/// * `Ok(None)` - No crawl has been checkpointed yet
/// * `Err(SnapshotError)` - The snapshot could not be read
pub fn load_statistics(store: &dyn ProgressStore) -> SnapshotResult<Option<CrawlStatistics>> {
    Ok(store.load()?.as_ref().map(CrawlStatistics::from_snapshot))
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Doc-Harvester Progress ===");
    println!();
    println!("Max depth:       {}", stats.max_depth);
    println!("Seeds:           {}", stats.seeds);
    println!("URLs visited:    {}", stats.visited);
    println!("Pages processed: {}", stats.processed);
    println!("Pages pending:   {}", stats.pending);
    for (depth, count) in &stats.pending_by_depth {
        println!("  depth {}: {}", depth, count);
    }
    if stats.in_flight > 0 {
        println!("In flight:       {} (skipped on resume)", stats.in_flight);
    }
    println!();
    println!("Documents stored:    {}", stats.documents_stored);
    println!("Duplicate documents: {}", stats.documents_duplicate);
    println!("Bytes stored:        {}", stats.bytes_stored);

    if !stats.categories.is_empty() {
        println!();
        println!("By category:");
        for (category, count) in &stats.categories {
            println!("  {}: {}", category, count);
        }
    }

    if !stats.failures_by_stage.is_empty() {
        println!();
        println!("Failures:");
        for (stage, count) in &stats.failures_by_stage {
            println!("  {}: {}", stage, count);
        }
    }
}
