//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end. The external classifier is replaced by
//! a deterministic stub.

use async_trait::async_trait;
use doc_harvester::classify::{
    Categorizer, ClassificationError, ClassificationRequest, ClassificationTask,
    ClassifierDecision, ContentClassifier, LinkVerdict,
};
use doc_harvester::config::{Config, RetryConfig};
use doc_harvester::crawler::Coordinator;
use doc_harvester::document::{DetectionSource, DocumentCandidate, DocumentIndex, DocumentKind};
use doc_harvester::download::{DownloadOutcome, Downloader};
use doc_harvester::output::{CrawlReport, RunStatus};
use doc_harvester::state::{FailureStage, PageStatus};
use doc_harvester::storage::{JsonFileStore, ProgressStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n%%EOF\n";

/// Says "document, category text" for any URL ending in `/notes`, "page" otherwise
struct StubClassifier;

#[async_trait]
impl ContentClassifier for StubClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierDecision, ClassificationError> {
        let is_notes = request.url.ends_with("/notes");
        Ok(match (request.task, is_notes) {
            (ClassificationTask::LinkNature, true) => ClassifierDecision {
                verdict: LinkVerdict::Document,
                category: Some("text".to_string()),
                confidence: 0.8,
            },
            (ClassificationTask::LinkNature, false) => ClassifierDecision {
                verdict: LinkVerdict::Page,
                category: None,
                confidence: 0.7,
            },
            (ClassificationTask::Category, _) => ClassifierDecision {
                verdict: LinkVerdict::Document,
                category: None,
                confidence: 0.0,
            },
        })
    }
}

fn fast_retry(max_attempts: u32, base_delay_ms: u64) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms,
        max_delay_ms: 2_000,
        jitter_ms: 0,
    }
}

/// Creates a test configuration writing everything under `dir`
fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.crawler.delay_secs = 0.0;
    config.crawler.cancel_grace_secs = 0;
    config.fetch.browser_profile_http = false;
    config.fetch.request_timeout_secs = 5;
    config.fetch.retry = fast_retry(2, 10);
    config.download.retry = fast_retry(3, 10);
    config.output.data_dir = dir.path().join("data");
    config
}

fn coordinator(config: Config, classifier: Option<Arc<dyn ContentClassifier>>) -> Coordinator {
    let store: Arc<dyn ProgressStore> = Arc::new(JsonFileStore::new(config.output.snapshot_path()));
    Coordinator::new(config, classifier, store).expect("Failed to build coordinator")
}

fn seed(server: &MockServer, route: &str) -> Vec<Url> {
    vec![Url::parse(&format!("{}{}", server.uri(), route)).expect("Failed to parse seed")]
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

fn pdf() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(PDF_BYTES, "application/pdf")
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

/// A page that never answers within the test's lifetime
async fn mount_hanging(server: &MockServer, route: &str) {
    mount(server, route, html("stuck").set_delay(Duration::from_secs(30)), 1).await;
}

/// Runs a crawl and drops it mid-flight, as a killed process would leave things
async fn run_until_killed(coordinator: &Coordinator, seeds: &[Url], after: Duration) {
    let outcome = tokio::time::timeout(after, coordinator.run(seeds, false)).await;
    assert!(outcome.is_err(), "crawl finished before it could be killed");
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

fn page_status(report: &CrawlReport, route: &str) -> Option<PageStatus> {
    report
        .pages
        .iter()
        .rev()
        .find(|p| Url::parse(&p.url).map(|u| u.path() == route).unwrap_or(false))
        .map(|p| p.status)
}

#[tokio::test]
async fn test_pages_and_ambiguous_documents_are_downloaded() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/docs",
        html(r#"<a href="report.pdf">Annual report</a> <a href="notes">Lecture notes</a>"#),
        1,
    )
    .await;
    mount(&server, "/report.pdf", pdf(), 1).await;
    mount(
        &server,
        "/notes",
        ResponseTemplate::new(200).set_body_raw("week one: introduction", "text/plain"),
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let organized = config.output.organized_dir();
    let coordinator = coordinator(config, Some(Arc::new(StubClassifier)));

    let report = coordinator.run(&seed(&server, "/docs"), false).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.status.exit_code(), 0);
    assert_eq!(report.documents.len(), 2);
    assert_eq!(report.totals.pages_fetched, 1);

    let report_doc = report
        .documents
        .iter()
        .find(|d| d.source_url.ends_with("/report.pdf"))
        .unwrap();
    assert_eq!(report_doc.category, "reports");
    assert_eq!(report_doc.confidence, 0.9);

    let notes = report
        .documents
        .iter()
        .find(|d| d.source_url.ends_with("/notes"))
        .unwrap();
    assert_eq!(notes.category, "text");
    assert_eq!(notes.kind, DocumentKind::Txt);

    for doc in &report.documents {
        assert!(doc.local_path.starts_with(organized.join("127.0.0.1")));
        assert!(doc.local_path.exists());
        assert_eq!(doc.checksum.len(), 64);
    }
    assert!(dir.path().join("data/final_report.json").exists());
}

#[tokio::test]
async fn test_shared_link_fetched_once() {
    let server = MockServer::start().await;
    mount(&server, "/", html(r#"<a href="/one/">One</a> <a href="/two/">Two</a>"#), 1).await;
    mount(&server, "/one/", html(r#"<a href="/shared/">Shared</a>"#), 1).await;
    mount(&server, "/two/", html(r#"<a href="/shared/">Shared</a> <a href="/">Home</a>"#), 1).await;
    mount(&server, "/shared/", html("leaf"), 1).await;

    let dir = TempDir::new().unwrap();
    let coordinator = coordinator(create_test_config(&dir), None);

    let report = coordinator.run(&seed(&server, "/"), false).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.totals.pages_fetched, 4);
    let depths: Vec<u32> = report.pages.iter().map(|p| p.depth).collect();
    assert_eq!(depths, vec![0, 1, 1, 2]);
}

#[tokio::test]
async fn test_depth_zero_fetches_only_seeds() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        html(r#"<a href="/next/">Next</a> <a href="/guide.pdf">Guide</a>"#),
        1,
    )
    .await;
    mount(&server, "/next/", html("never"), 0).await;
    mount(&server, "/guide.pdf", pdf(), 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.max_depth = 0;
    let coordinator = coordinator(config, None);

    let report = coordinator.run(&seed(&server, "/"), false).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.totals.pages_processed, 1);
    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.documents[0].category, "technical_docs");
}

#[tokio::test]
async fn test_depth_limit_still_captures_documents() {
    let server = MockServer::start().await;
    mount(&server, "/", html(r#"<a href="/a/">A</a>"#), 1).await;
    mount(
        &server,
        "/a/",
        html(r#"<a href="/b/">B</a> <a href="/files/deep.pdf">Deep</a>"#),
        1,
    )
    .await;
    mount(&server, "/b/", html("too deep"), 0).await;
    mount(&server, "/files/deep.pdf", pdf(), 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.max_depth = 1;
    let coordinator = coordinator(config, None);

    let report = coordinator.run(&seed(&server, "/"), false).await.unwrap();

    assert_eq!(report.totals.pages_processed, 2);
    assert!(report.pages.iter().all(|p| p.depth <= 1));
    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.documents[0].found_on.as_deref().map(|p| p.ends_with("/a/")), Some(true));
}

#[tokio::test]
async fn test_resume_after_crash_skips_in_flight_and_done_work() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/docs",
        html(r#"<a href="/page-a/">A</a> <a href="/page-b/">B</a> <a href="/report.pdf">Report</a>"#),
        1,
    )
    .await;
    mount(&server, "/report.pdf", pdf(), 1).await;
    mount(&server, "/page-a/", html("abandoned"), 0).await;
    mount(&server, "/page-b/", html(r#"<a href="/report.pdf">Report again</a>"#), 1).await;

    let dir = TempDir::new().unwrap();
    let seeds = seed(&server, "/docs");

    // First run stops after the seed page with two pages queued
    let mut config = create_test_config(&dir);
    config.crawler.max_pages = Some(1);
    let snapshot_path = config.output.snapshot_path();
    let first = coordinator(config, None).run(&seeds, false).await.unwrap();
    assert_eq!(first.status, RunStatus::Interrupted);
    assert_eq!(first.status.exit_code(), 4);
    assert_eq!(first.totals.pages_pending, 2);
    assert_eq!(first.documents.len(), 1);

    // Simulate a crash while /page-a/ was being processed
    let store = JsonFileStore::new(&snapshot_path);
    let mut snapshot = store.load().unwrap().unwrap();
    let stuck = snapshot.pending.remove(0);
    assert!(stuck.url.ends_with("/page-a/"));
    snapshot.in_flight.push(stuck);
    store.save(&snapshot).unwrap();

    let second = coordinator(create_test_config(&dir), None)
        .run(&seeds, true)
        .await
        .unwrap();

    assert_eq!(second.status, RunStatus::CompletedWithFailures);
    assert_eq!(second.status.exit_code(), 3);
    assert_eq!(second.documents.len(), 1);
    assert_eq!(second.totals.pages_pending, 0);
    assert_eq!(second.started_at, first.started_at);
    assert_eq!(second.totals.failures_by_stage.get("resume"), Some(&1));
    assert!(second
        .failures
        .iter()
        .any(|f| f.stage == FailureStage::Resume && f.url.ends_with("/page-a/")));
}

#[tokio::test]
async fn test_download_retries_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount(&server, "/flaky.pdf", pdf(), 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.download.retry = fast_retry(3, 100);
    let downloader = Downloader::new(reqwest::Client::new(), &config.download, &config.output);

    let candidate = DocumentCandidate::new(
        format!("{}/flaky.pdf", server.uri()),
        DocumentKind::Pdf,
        DetectionSource::Extension,
        0.95,
    );

    let started = Instant::now();
    let outcome = downloader
        .download(&candidate, &DocumentIndex::new(), &Categorizer::rules_only())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // 100ms after the first failure, 200ms after the second
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(matches!(outcome, DownloadOutcome::Stored(_)));
    assert_eq!(outcome.record().retry_count, 2);
}

#[tokio::test]
async fn test_identical_content_stored_once() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        html(r#"<a href="/a/handout.pdf">A</a> <a href="/b/handout.pdf">B</a>"#),
        1,
    )
    .await;
    mount(&server, "/a/handout.pdf", pdf(), 1).await;
    mount(&server, "/b/handout.pdf", pdf(), 1).await;

    let dir = TempDir::new().unwrap();
    let coordinator = coordinator(create_test_config(&dir), None);

    let report = coordinator.run(&seed(&server, "/"), false).await.unwrap();

    assert_eq!(report.totals.documents_stored, 1);
    assert_eq!(report.totals.documents_duplicate, 1);
    let (first, second) = (&report.documents[0], &report.documents[1]);
    assert_eq!(first.checksum, second.checksum);
    assert_eq!(first.local_path, second.local_path);
    assert_eq!(second.duplicate_of.as_deref(), Some(first.source_url.as_str()));
}

#[tokio::test]
async fn test_failures_complete_with_failures() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        html(r#"<a href="/broken/">Broken</a> <a href="/fake.pdf">Fake</a>"#),
        1,
    )
    .await;
    // Two fetch attempts, then the chain is exhausted
    mount(&server, "/broken/", ResponseTemplate::new(500), 2).await;
    // A content-type mismatch is retried once before it is final
    mount(&server, "/fake.pdf", html("not a pdf"), 2).await;

    let dir = TempDir::new().unwrap();
    let coordinator = coordinator(create_test_config(&dir), None);

    let report = coordinator.run(&seed(&server, "/"), false).await.unwrap();

    assert_eq!(report.status, RunStatus::CompletedWithFailures);
    assert_eq!(report.totals.pages_failed, 1);
    assert_eq!(report.totals.failures_by_stage.get("fetch"), Some(&1));
    assert_eq!(report.totals.failures_by_stage.get("download"), Some(&1));
    assert!(report.documents.is_empty());

    let fetch_failure = report
        .failures
        .iter()
        .find(|f| f.stage == FailureStage::Fetch)
        .unwrap();
    assert!(fetch_failure.url.ends_with("/broken/"));
    assert!(fetch_failure.origin.is_some());
}

#[tokio::test]
async fn test_cancellation_defers_current_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow/"))
        .respond_with(html("late").set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let snapshot_path = config.output.snapshot_path();
    let coordinator = coordinator(config, None);
    let token = coordinator.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let started = Instant::now();
    let report = coordinator.run(&seed(&server, "/slow/"), false).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.status, RunStatus::Interrupted);
    assert_eq!(report.totals.pages_processed, 0);
    assert_eq!(report.totals.pages_pending, 1);

    let snapshot = JsonFileStore::new(&snapshot_path).load().unwrap().unwrap();
    assert!(snapshot.in_flight.is_empty());
    assert!(snapshot.pending[0].url.ends_with("/slow/"));
}

#[tokio::test]
async fn test_killed_run_with_batched_checkpoints_loses_no_work() {
    let server = MockServer::start().await;
    // Fetched by the killed run and again on resume
    mount(&server, "/", html(r#"<a href="/a/">A</a> <a href="/b/">B</a>"#), 2).await;
    mount_hanging(&server, "/a/").await;
    mount(&server, "/b/", html("leaf"), 1).await;

    let dir = TempDir::new().unwrap();
    let seeds = seed(&server, "/");
    let mut config = create_test_config(&dir);
    config.crawler.checkpoint_interval = 3;

    run_until_killed(&coordinator(config.clone(), None), &seeds, Duration::from_millis(1500)).await;

    let report = coordinator(config, None).run(&seeds, true).await.unwrap();

    assert_eq!(report.status, RunStatus::CompletedWithFailures);
    assert_eq!(report.totals.pages_pending, 0);
    assert_eq!(page_status(&report, "/"), Some(PageStatus::Fetched));
    assert_eq!(page_status(&report, "/b/"), Some(PageStatus::Fetched));
    assert_eq!(page_status(&report, "/a/"), Some(PageStatus::Abandoned));

    let resumed: Vec<&str> = report
        .failures
        .iter()
        .filter(|f| f.stage == FailureStage::Resume)
        .map(|f| f.url.as_str())
        .collect();
    assert_eq!(resumed.len(), 1);
    assert!(resumed[0].ends_with("/a/"));
}

#[tokio::test]
async fn test_document_stored_before_kill_is_not_stored_again() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        html(r#"<a href="/report.pdf">Report</a> <a href="/a/">A</a> <a href="/b/">B</a>"#),
        2,
    )
    .await;
    mount(&server, "/report.pdf", pdf(), 1).await;
    mount_hanging(&server, "/a/").await;
    mount(&server, "/b/", html(r#"<a href="/report.pdf">Report again</a>"#), 1).await;

    let dir = TempDir::new().unwrap();
    let seeds = seed(&server, "/");
    let mut config = create_test_config(&dir);
    config.crawler.checkpoint_interval = 10;
    let organized = config.output.organized_dir();

    run_until_killed(&coordinator(config.clone(), None), &seeds, Duration::from_millis(1500)).await;
    assert_eq!(files_under(&organized).len(), 1);

    let report = coordinator(config, None).run(&seeds, true).await.unwrap();

    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.totals.documents_stored, 1);
    let files = files_under(&organized);
    assert_eq!(files.len(), 1, "{:?}", files);
    assert_eq!(files[0], report.documents[0].local_path);
}

#[tokio::test]
async fn test_seed_served_as_document_is_downloaded() {
    let server = MockServer::start().await;
    // Once as a page (headers only), once by the downloader
    mount(&server, "/get", pdf(), 2).await;

    let dir = TempDir::new().unwrap();
    let coordinator = coordinator(create_test_config(&dir), None);

    let report = coordinator.run(&seed(&server, "/get"), false).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.documents[0].kind, DocumentKind::Pdf);
    assert!(report.documents[0].local_path.exists());
}

#[tokio::test]
async fn test_report_written_and_readable() {
    let server = MockServer::start().await;
    mount(&server, "/", html(r#"<a href="/syllabus.pdf">Syllabus</a>"#), 1).await;
    mount(&server, "/syllabus.pdf", pdf(), 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.output.summary_path = Some(dir.path().join("summary.md"));
    let report_path = config.output.report_path();
    let coordinator = coordinator(config, None);

    let report = coordinator.run(&seed(&server, "/"), false).await.unwrap();
    let on_disk = CrawlReport::read_json(&report_path).unwrap();

    assert_eq!(on_disk.status, report.status);
    assert_eq!(on_disk.documents, report.documents);
    assert_eq!(on_disk.totals.categories.get("syllabus"), Some(&1));

    let summary = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(summary.contains("syllabus"));
}
