//! Breadth-first crawl frontier
//!
//! The frontier owns the pending queue and the visited set. A URL joins the
//! visited set the moment it is enqueued and never leaves it, so every page is
//! fetched at most once per crawl. Children are appended behind everything
//! already queued, which keeps processing level by level.

use crate::state::WorkItem;
use crate::storage::ProgressSnapshot;
use std::collections::{HashSet, VecDeque};

/// What happened to a URL offered to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    AlreadyVisited,
    /// The item would be deeper than the crawl allows; it is discarded for good
    DepthExceeded,
}

#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<WorkItem>,
    visited: HashSet<String>,
    processed: HashSet<String>,
    max_depth: u32,
}

impl Frontier {
    pub fn new(max_depth: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            processed: HashSet::new(),
            max_depth,
        }
    }

    /// Rebuilds the frontier exactly as it stood in a snapshot
    pub fn from_snapshot(snapshot: &ProgressSnapshot) -> Self {
        Self {
            queue: snapshot.pending.iter().cloned().collect(),
            visited: snapshot.visited.iter().cloned().collect(),
            processed: snapshot.processed.iter().cloned().collect(),
            max_depth: snapshot.max_depth,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Offers a seed URL at depth 0
    pub fn push_seed(&mut self, url: impl Into<String>) -> EnqueueOutcome {
        self.offer(WorkItem::seed(url))
    }

    /// Offers a link found on `parent`, one level deeper
    pub fn push_child(&mut self, parent: &WorkItem, url: impl Into<String>) -> EnqueueOutcome {
        self.offer(WorkItem::child_of(parent, url))
    }

    fn offer(&mut self, item: WorkItem) -> EnqueueOutcome {
        if item.depth > self.max_depth {
            return EnqueueOutcome::DepthExceeded;
        }
        if !self.visited.insert(item.url.clone()) {
            return EnqueueOutcome::AlreadyVisited;
        }
        tracing::trace!("Enqueued {} at depth {}", item.url, item.depth);
        self.queue.push_back(item);
        EnqueueOutcome::Enqueued
    }

    /// Marks a URL as visited without queueing it
    ///
    /// Used for redirect targets so the resource they name is not fetched
    /// again under its final address. Returns false if it was already known.
    pub fn mark_visited(&mut self, url: impl Into<String>) -> bool {
        self.visited.insert(url.into())
    }

    pub fn pop(&mut self) -> Option<WorkItem> {
        self.queue.pop_front()
    }

    /// Returns an item to the head of the queue so it is processed next
    pub fn defer(&mut self, item: WorkItem) {
        self.queue.push_front(item);
    }

    pub fn mark_processed(&mut self, url: &str) {
        self.processed.insert(url.to_string());
    }

    /// Drops queued items that were already processed
    pub fn drop_processed(&mut self) {
        let processed = &self.processed;
        self.queue.retain(|item| !processed.contains(&item.url));
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.processed.contains(url)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &WorkItem> {
        self.queue.iter()
    }

    /// Visited URLs, sorted for a stable snapshot
    pub fn visited_sorted(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.visited.iter().cloned().collect();
        urls.sort();
        urls
    }

    pub fn processed_sorted(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.processed.iter().cloned().collect();
        urls.sort();
        urls
    }
}
