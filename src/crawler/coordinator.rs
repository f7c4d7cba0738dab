//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Seeding the frontier or restoring it from a snapshot
//! - Fetching, extracting and downloading per work item
//! - Enqueuing discovered pages within the depth bound
//! - Checkpointing progress and honoring cancellation
//! - Writing the final report

use crate::classify::{Categorizer, ContentClassifier, OllamaClassifier};
use crate::config::Config;
use crate::crawler::extractor::Extractor;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::frontier::{EnqueueOutcome, Frontier};
use crate::crawler::scheduler::HostPacer;
use crate::document::{DocumentCandidate, DocumentIndex, DownloadedDocument};
use crate::download::{DownloadOutcome, Downloader};
use crate::output::{self, CrawlReport, RunStatus};
use crate::state::{CrawlLedger, FailureStage, PageRecord, PageStatus, WorkItem};
use crate::storage::{open_store, ProgressSnapshot, ProgressStore, SNAPSHOT_VERSION};
use crate::url::{extract_domain, normalize_parsed};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pages between two progress log lines
const PROGRESS_LOG_INTERVAL: u64 = 10;

/// Everything the controller mutates during a run
struct CrawlState {
    frontier: Frontier,
    ledger: CrawlLedger,
    downloaded: Vec<DownloadedDocument>,
    index: DocumentIndex,
    /// Document URLs whose download finished, successfully or not
    documents_done: HashSet<String>,
    seeds: Vec<String>,
    started_at: DateTime<Utc>,
    since_checkpoint: u32,
}

impl CrawlState {
    fn fresh(max_depth: u32) -> Self {
        Self {
            frontier: Frontier::new(max_depth),
            ledger: CrawlLedger::new(),
            downloaded: Vec::new(),
            index: DocumentIndex::new(),
            documents_done: HashSet::new(),
            seeds: Vec::new(),
            started_at: Utc::now(),
            since_checkpoint: 0,
        }
    }

    /// Restores state from a snapshot
    ///
    /// Items the store reports as in flight when the previous run stopped are
    /// recorded as abandoned and never retried.
    fn resume(snapshot: ProgressSnapshot, requested_depth: u32) -> Self {
        if snapshot.max_depth != requested_depth {
            tracing::warn!(
                "Resuming with the snapshot's max depth {} (requested {} is ignored)",
                snapshot.max_depth,
                requested_depth
            );
        }

        let mut frontier = Frontier::from_snapshot(&snapshot);
        let mut ledger = snapshot.ledger;
        for item in &snapshot.in_flight {
            ledger.record_failure(
                item.url.as_str(),
                FailureStage::Resume,
                "in flight when the previous run stopped; skipped",
                item.origin.clone(),
            );
            ledger.record_page(PageRecord {
                url: item.url.clone(),
                depth: item.depth,
                status: PageStatus::Abandoned,
                strategy: None,
                links_enqueued: 0,
                documents_found: Vec::new(),
                at: Utc::now(),
            });
            frontier.mark_processed(&item.url);
        }
        frontier.drop_processed();

        let mut documents_done: HashSet<String> = snapshot
            .downloaded
            .iter()
            .map(|d| d.source_url.clone())
            .collect();
        documents_done.extend(
            ledger
                .failures
                .iter()
                .filter(|f| f.stage == FailureStage::Download)
                .map(|f| f.url.clone()),
        );

        tracing::info!(
            "Resumed: {} pending, {} visited, {} documents downloaded",
            frontier.len(),
            frontier.visited_count(),
            snapshot.downloaded.len()
        );

        Self {
            frontier,
            ledger,
            index: DocumentIndex::from_records(&snapshot.downloaded),
            downloaded: snapshot.downloaded,
            documents_done,
            seeds: snapshot.seeds,
            started_at: snapshot.started_at,
            since_checkpoint: 0,
        }
    }

    /// Captures the state for the store
    ///
    /// `current` is the popped item still being worked on. It is saved at the
    /// head of the queue; the store's in-flight marker tells a resumed run
    /// whether it had started.
    fn snapshot(&self, current: Option<&WorkItem>) -> ProgressSnapshot {
        ProgressSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            started_at: self.started_at,
            max_depth: self.frontier.max_depth(),
            seeds: self.seeds.clone(),
            visited: self.frontier.visited_sorted(),
            processed: self.frontier.processed_sorted(),
            pending: current
                .into_iter()
                .chain(self.frontier.pending())
                .cloned()
                .collect(),
            in_flight: Vec::new(),
            downloaded: self.downloaded.clone(),
            ledger: self.ledger.clone(),
        }
    }

    fn fail_page(&mut self, item: &WorkItem, error: impl fmt::Display) {
        self.ledger.record_failure(
            item.url.as_str(),
            FailureStage::Fetch,
            error,
            item.origin.clone(),
        );
        self.ledger.record_page(PageRecord {
            url: item.url.clone(),
            depth: item.depth,
            status: PageStatus::Failed,
            strategy: None,
            links_enqueued: 0,
            documents_found: Vec::new(),
            at: Utc::now(),
        });
    }
}

/// Main crawler coordinator structure
///
/// Owns the frontier state for the duration of `run`; the fetcher,
/// extractor, categorizer and downloader only ever see inputs and return
/// outputs.
pub struct Coordinator {
    config: Arc<Config>,
    fetcher: Fetcher,
    extractor: Extractor,
    categorizer: Categorizer,
    downloader: Downloader,
    store: Arc<dyn ProgressStore>,
    pacer: HostPacer,
    cancel: CancellationToken,
    grace: Duration,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `classifier` - Optional external classifier for ambiguous links and categories
    /// * `store` - Where progress snapshots are kept
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - An HTTP client could not be built
    pub fn new(
        config: Config,
        classifier: Option<Arc<dyn ContentClassifier>>,
        store: Arc<dyn ProgressStore>,
    ) -> Result<Self, HarvestError> {
        let fetcher = Fetcher::from_config(&config)?;
        let extractor = Extractor::new(classifier.clone(), &config.classifier, config.filters.clone());
        let categorizer = Categorizer::new(classifier, config.classifier.timeout());
        let downloader = Downloader::from_config(&config)?;
        let pacer = HostPacer::new(config.crawler.delay());
        let grace = config.crawler.cancel_grace();

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            extractor,
            categorizer,
            downloader,
            store,
            pacer,
            cancel: CancellationToken::new(),
            grace,
        })
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the main crawl loop
    ///
    /// Pops work items breadth-first until the queue is empty, the page
    /// budget is spent, or cancellation is requested. The final snapshot and
    /// report are flushed in every case.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Seed URLs (depth 0)
    /// * `resume` - Continue from the stored snapshot instead of starting fresh
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The run ended; its status tells how
    /// * `Err(HarvestError)` - The snapshot or report could not be read or written
    pub async fn run(&self, seeds: &[Url], resume: bool) -> Result<CrawlReport, HarvestError> {
        let run_started_at = Utc::now();
        let clock = Instant::now();
        self.prepare_data_dir()?;
        let mut state = self.initial_state(seeds, resume)?;
        let checkpoint_interval = self.config.crawler.checkpoint_interval.max(1);
        // Forces a snapshot before the first item
        state.since_checkpoint = checkpoint_interval;

        tracing::info!(
            "Starting crawl: {} pending, max depth {}, delay {:?}",
            state.frontier.len(),
            state.frontier.max_depth(),
            self.pacer.delay()
        );

        let mut interrupted = false;
        let mut pages_this_run: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested; stopping");
                interrupted = true;
                break;
            }
            if let Some(limit) = self.config.crawler.max_pages {
                if pages_this_run >= limit && !state.frontier.is_empty() {
                    tracing::info!(
                        "Page budget of {} reached with {} items pending",
                        limit,
                        state.frontier.len()
                    );
                    interrupted = true;
                    break;
                }
            }

            let Some(item) = state.frontier.pop() else {
                tracing::info!("Frontier is empty, crawl complete");
                break;
            };
            if state.frontier.is_processed(&item.url) {
                continue;
            }

            if state.since_checkpoint >= checkpoint_interval {
                self.checkpoint(&mut state, Some(&item))?;
            }
            self.store.mark_in_flight(Some(&item))?;

            let finished = self.guarded(self.process_item(&mut state, &item)).await;
            match finished {
                Some(result) => {
                    result?;
                    state.frontier.mark_processed(&item.url);
                    self.store.mark_in_flight(None)?;
                    state.since_checkpoint += 1;
                    pages_this_run += 1;
                }
                None => {
                    tracing::warn!(
                        "{} did not finish within the {:?} grace period; deferred to the next run",
                        item.url,
                        self.grace
                    );
                    state.frontier.defer(item);
                    self.store.mark_in_flight(None)?;
                    interrupted = true;
                    break;
                }
            }

            if pages_this_run % PROGRESS_LOG_INTERVAL == 0 {
                tracing::info!(
                    "Progress: {} pages this run, {} pending, {} documents, {:.2} pages/sec",
                    pages_this_run,
                    state.frontier.len(),
                    state.downloaded.len(),
                    pages_this_run as f64 / clock.elapsed().as_secs_f64().max(f64::EPSILON)
                );
            }
        }

        let status = if interrupted {
            RunStatus::Interrupted
        } else if state.ledger.has_failures() {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        };

        let snapshot = state.snapshot(None);
        self.store.save(&snapshot)?;

        let report = CrawlReport::from_snapshot(&snapshot, status, run_started_at);
        output::write_outputs(&report, &self.config.output)?;

        tracing::info!(
            "Crawl {}: {} pages this run, {} documents stored, {} failures, {:?}",
            status,
            pages_this_run,
            report.totals.documents_stored,
            report.totals.failures,
            clock.elapsed()
        );
        Ok(report)
    }

    fn prepare_data_dir(&self) -> Result<(), HarvestError> {
        let dir = &self.config.output.data_dir;
        if dir.exists() && !dir.is_dir() {
            return Err(HarvestError::Storage(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        std::fs::create_dir_all(dir)?;
        Ok(())
    }

    fn initial_state(&self, seeds: &[Url], resume: bool) -> Result<CrawlState, HarvestError> {
        let max_depth = self.config.crawler.max_depth;
        let mut state = if resume {
            match self.store.load()? {
                Some(snapshot) => CrawlState::resume(snapshot, max_depth),
                None => {
                    tracing::warn!("No progress snapshot found; starting a fresh crawl");
                    CrawlState::fresh(max_depth)
                }
            }
        } else {
            if let Ok(Some(_)) = self.store.load() {
                tracing::warn!("Starting a fresh crawl; the existing progress snapshot will be replaced (use --resume to continue it)");
            }
            self.store.mark_in_flight(None)?;
            CrawlState::fresh(max_depth)
        };

        for seed in seeds {
            let normalized = match normalize_parsed(seed.clone()) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping seed {}: {}", seed, e);
                    continue;
                }
            };
            match state.frontier.push_seed(normalized.as_str()) {
                EnqueueOutcome::Enqueued => state.seeds.push(normalized.to_string()),
                EnqueueOutcome::AlreadyVisited => {
                    tracing::debug!("Seed {} already visited", normalized)
                }
                EnqueueOutcome::DepthExceeded => {}
            }
        }
        Ok(state)
    }

    /// Runs `work` to completion unless cancellation is requested
    ///
    /// After cancellation the work gets the grace period to finish; `None`
    /// means it was abandoned.
    async fn guarded<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::pin!(work);
        tokio::select! {
            output = &mut work => return Some(output),
            _ = self.cancel.cancelled() => {}
        }
        tokio::time::timeout(self.grace, work).await.ok()
    }

    fn checkpoint(&self, state: &mut CrawlState, current: Option<&WorkItem>) -> Result<(), HarvestError> {
        self.store.save(&state.snapshot(current))?;
        state.since_checkpoint = 0;
        tracing::debug!(
            "Checkpoint: {} pending, {} visited",
            state.frontier.len(),
            state.frontier.visited_count()
        );
        Ok(())
    }

    /// Processes a single work item
    ///
    /// Fetch failures are recorded and end the item; they never abort the run.
    /// Only a snapshot that cannot be written does.
    async fn process_item(&self, state: &mut CrawlState, item: &WorkItem) -> Result<(), HarvestError> {
        tracing::info!("[depth {}] {}", item.depth, item.url);

        let url = match Url::parse(&item.url) {
            Ok(url) => url,
            Err(e) => {
                state.fail_page(item, format!("invalid URL: {}", e));
                return Ok(());
            }
        };

        let fetched = {
            let host = extract_domain(&url).unwrap_or_default();
            let _turn = self.pacer.wait_turn(&host).await;
            self.fetcher.fetch(&url).await
        };
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                state.fail_page(item, &e);
                return Ok(());
            }
        };

        if let Ok(final_url) = normalize_parsed(fetched.final_url.clone()) {
            if final_url.as_str() != item.url && state.frontier.mark_visited(final_url.as_str()) {
                tracing::debug!("{} redirected to {}", item.url, final_url);
            }
        }

        let extraction = self.extractor.extract(&fetched).await;
        for (link, error) in &extraction.classification_failures {
            state.ledger.record_failure(
                link.as_str(),
                FailureStage::Classification,
                error,
                Some(item.url.clone()),
            );
        }

        let mut links_enqueued = 0;
        let mut beyond_depth = 0;
        for link in &extraction.links {
            match state.frontier.push_child(item, link.as_str()) {
                EnqueueOutcome::Enqueued => links_enqueued += 1,
                EnqueueOutcome::DepthExceeded => beyond_depth += 1,
                EnqueueOutcome::AlreadyVisited => {}
            }
        }
        if beyond_depth > 0 {
            tracing::debug!("{} links on {} are beyond max depth", beyond_depth, item.url);
        }

        let documents_found: Vec<String> = extraction.documents.iter().map(|d| d.url.clone()).collect();
        for candidate in &extraction.documents {
            self.acquire(state, candidate, item).await?;
        }

        state.ledger.record_page(PageRecord {
            url: item.url.clone(),
            depth: item.depth,
            status: PageStatus::Fetched,
            strategy: Some(fetched.strategy_used.to_string()),
            links_enqueued,
            documents_found,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Downloads one document candidate unless it was already handled
    ///
    /// A newly stored file is checkpointed at once so a resumed run knows
    /// its checksum.
    async fn acquire(
        &self,
        state: &mut CrawlState,
        candidate: &DocumentCandidate,
        page: &WorkItem,
    ) -> Result<(), HarvestError> {
        if state.documents_done.contains(&candidate.url) {
            tracing::debug!("Document {} already handled", candidate.url);
            return Ok(());
        }

        let host = Url::parse(&candidate.url)
            .ok()
            .and_then(|u| extract_domain(&u))
            .unwrap_or_default();
        let result = {
            let _turn = self.pacer.wait_turn(&host).await;
            self.downloader
                .download(candidate, &state.index, &self.categorizer)
                .await
        };

        let mut stored = false;
        match result {
            Ok(outcome) => {
                if let DownloadOutcome::Stored(doc) = &outcome {
                    stored = true;
                    tracing::info!(
                        "Stored {} as {} [{}]",
                        doc.source_url,
                        doc.local_path.display(),
                        doc.category
                    );
                }
                let record = outcome.into_record();
                state.index.insert(&record);
                state.downloaded.push(record);
            }
            Err(e) => {
                state.ledger.record_failure(
                    candidate.url.as_str(),
                    FailureStage::Download,
                    &e,
                    Some(page.url.clone()),
                );
            }
        }
        state.documents_done.insert(candidate.url.clone());
        if stored {
            self.checkpoint(state, Some(page))?;
        }
        Ok(())
    }
}

/// Runs a complete crawl
///
/// Builds the classifier (when enabled), opens the snapshot store named by
/// the configuration, and runs a [`Coordinator`] until it stops.
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `seeds` - Seed URLs
/// * `resume` - Continue from the stored snapshot
/// * `cancel` - Token that stops the crawl when cancelled
///
/// # Example
///
/// ```no_run
/// use doc_harvester::config::Config;
/// use doc_harvester::crawler::run_crawl;
/// use tokio_util::sync::CancellationToken;
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let seeds = vec![Url::parse("https://example.com/docs")?];
/// let report = run_crawl(Config::default(), seeds, false, CancellationToken::new()).await?;
/// println!("{} documents", report.totals.documents_stored);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    seeds: Vec<Url>,
    resume: bool,
    cancel: CancellationToken,
) -> Result<CrawlReport, HarvestError> {
    let classifier = OllamaClassifier::from_config(&config.classifier)?;
    let store: Arc<dyn ProgressStore> = Arc::new(open_store(&config.output.snapshot_path()));
    let coordinator = Coordinator::new(config, classifier, store)?.with_cancellation(cancel);
    coordinator.run(&seeds, resume).await
}
