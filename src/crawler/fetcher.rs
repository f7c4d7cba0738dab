//! Page fetcher with an ordered strategy fallback chain
//!
//! A [`Fetcher`] holds a list of capability-equivalent [`FetchStrategy`]
//! implementations and tries them in order until one returns usable content:
//!
//! 1. `primary` - headless browser rendering over WebDriver
//! 2. `fallback_1` - a second WebDriver endpoint (other engine or profile)
//! 3. `fallback_2` - static HTTP with desktop browser headers
//! 4. `static` - static HTTP identified as the crawler
//!
//! Every attempt of every strategy goes through the same [`RetryPolicy`] and
//! is bounded by the strategy's timeout. Strategies that are unavailable or
//! blocked are skipped without burning their remaining attempts.

use crate::config::{Config, UserAgentConfig};
use crate::crawler::retry::{
    classify_reqwest_error, classify_status, FailureKind, RetryDecision, RetryPolicy,
};
use crate::crawler::webdriver::WebDriverStrategy;
use crate::document::DocumentKind;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed by the HTTP strategies
const MAX_REDIRECTS: usize = 10;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Position of a strategy in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "primary")]
    Primary,
    #[serde(rename = "fallback_1")]
    Fallback1,
    #[serde(rename = "fallback_2")]
    Fallback2,
    #[serde(rename = "static")]
    Static,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback1 => "fallback_1",
            Self::Fallback2 => "fallback_2",
            Self::Static => "static",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a fetched resource
#[derive(Debug, Clone, PartialEq)]
pub enum PageBody {
    Text(String),
    /// Document or binary content; the body is left on the wire and the
    /// downloader retrieves it under its own size cap
    Unread,
}

impl PageBody {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Unread => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Unread => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Unread => None,
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects or client-side navigation
    pub final_url: Url,
    pub status_code: u16,
    /// Content-Type header value (empty if the server sent none)
    pub content_type: String,
    pub body: PageBody,
    pub strategy_used: StrategyKind,
}

impl FetchResult {
    /// Whether the content can be handed to the extractor
    pub fn is_usable(&self) -> bool {
        (200..300).contains(&self.status_code) && !self.body.is_empty()
    }
}

/// Failure of a single strategy attempt
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    /// The rendering engine could not be reached or refused to start a session
    #[error("strategy unavailable: {0}")]
    Unavailable(String),

    /// The site answered with an anti-bot interstitial
    #[error("blocked by anti-bot protection: {0}")]
    Blocked(String),

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Content arrived but cannot be used (empty body)
    #[error("unusable content: {0}")]
    Unusable(String),

    /// The engine returned something that does not follow its protocol
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StrategyError {
    /// How the retry policy should treat this error
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Http { status } => classify_status(*status),
            Self::Network(_) | Self::Timeout(_) | Self::Protocol(_) => FailureKind::Transient,
            Self::Unavailable(_) | Self::Blocked(_) | Self::Unusable(_) => FailureKind::Permanent,
        }
    }

    /// Errors that move straight on to the next strategy
    pub fn skips_strategy(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Blocked(_) | Self::Unusable(_)
        )
    }

    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            return Self::Timeout(timeout);
        }
        if let Some(status) = error.status() {
            return Self::Http {
                status: status.as_u16(),
            };
        }
        match classify_reqwest_error(&error) {
            FailureKind::Permanent => Self::Unusable(error.to_string()),
            _ => Self::Network(error.to_string()),
        }
    }
}

/// One interchangeable way of retrieving a page
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Upper bound on a single attempt
    fn timeout(&self) -> Duration;

    /// Performs one attempt; retries are the caller's concern
    async fn fetch(&self, url: &Url) -> Result<FetchResult, StrategyError>;
}

/// The last error a strategy produced before the chain moved on
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    pub strategy: StrategyKind,
    pub attempts: u32,
    pub error: StrategyError,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} attempt{}): {}",
            self.strategy,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.error
        )
    }
}

/// Every strategy in the chain failed for a URL
#[derive(Debug, Clone, Error)]
#[error("all fetch strategies failed for {url}: {}", summarize(.failures))]
pub struct FetchError {
    pub url: String,
    pub failures: Vec<StrategyFailure>,
}

fn summarize(failures: &[StrategyFailure]) -> String {
    if failures.is_empty() {
        return "no strategies configured".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Static HTTP retrieval through reqwest
pub struct HttpStrategy {
    client: Client,
    kind: StrategyKind,
    timeout: Duration,
}

impl HttpStrategy {
    pub fn new(client: Client, kind: StrategyKind, timeout: Duration) -> Self {
        Self {
            client,
            kind,
            timeout,
        }
    }

    /// Plain crawler-identified strategy, always last in the chain
    pub fn crawler(user_agent: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, timeout)?;
        Ok(Self::new(client, StrategyKind::Static, timeout))
    }

    /// Strategy that presents desktop browser headers
    pub fn browser_profile(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = build_browser_client(timeout)?;
        Ok(Self::new(client, StrategyKind::Fallback2, timeout))
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &Url) -> Result<FetchResult, StrategyError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| StrategyError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StrategyError::Http {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = if reads_as_page(&content_type) {
            PageBody::Text(
                response
                    .text()
                    .await
                    .map_err(|e| StrategyError::from_reqwest(e, self.timeout))?,
            )
        } else {
            tracing::debug!("{} served as {}; body left for the downloader", url, content_type);
            PageBody::Unread
        };

        Ok(FetchResult {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
            strategy_used: self.kind,
        })
    }
}

/// Ordered strategy chain with uniform retry
pub struct Fetcher {
    strategies: Vec<Arc<dyn FetchStrategy>>,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>, retry: RetryPolicy) -> Self {
        Self { strategies, retry }
    }

    /// Builds the chain described by the configuration
    ///
    /// WebDriver strategies are included only when their endpoints are
    /// configured; the crawler-identified static strategy is always last.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let mut strategies: Vec<Arc<dyn FetchStrategy>> = Vec::new();
        let render_timeout = Duration::from_secs(config.fetch.render_timeout_secs);
        let request_timeout = Duration::from_secs(config.fetch.request_timeout_secs);

        if let Some(endpoint) = &config.browser.primary {
            strategies.push(Arc::new(WebDriverStrategy::new(
                StrategyKind::Primary,
                endpoint,
                &config.browser,
                render_timeout,
            )?));
        }
        if let Some(endpoint) = &config.browser.fallback {
            strategies.push(Arc::new(WebDriverStrategy::new(
                StrategyKind::Fallback1,
                endpoint,
                &config.browser,
                render_timeout,
            )?));
        }
        if config.fetch.browser_profile_http {
            strategies.push(Arc::new(HttpStrategy::browser_profile(request_timeout)?));
        }
        strategies.push(Arc::new(HttpStrategy::crawler(
            &config.user_agent,
            request_timeout,
        )?));

        tracing::debug!(
            "Fetch chain: {}",
            strategies
                .iter()
                .map(|s| s.kind().as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Ok(Self::new(
            strategies,
            RetryPolicy::from_config(&config.fetch.retry),
        ))
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Fetches a URL, falling back through the chain
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult)` - The first usable result
    /// * `Err(FetchError)` - Every strategy failed; carries the last error of each
    pub async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            match self.fetch_with_retry(strategy.as_ref(), url).await {
                Ok(result) => {
                    if !failures.is_empty() {
                        tracing::info!(
                            "Fetched {} via {} after {} strategy failure(s)",
                            url,
                            result.strategy_used,
                            failures.len()
                        );
                    }
                    return Ok(result);
                }
                Err(failure) => {
                    tracing::debug!("Strategy failed for {}: {}", url, failure);
                    failures.push(failure);
                }
            }
        }

        Err(FetchError {
            url: url.to_string(),
            failures,
        })
    }

    async fn fetch_with_retry(
        &self,
        strategy: &dyn FetchStrategy,
        url: &Url,
    ) -> Result<FetchResult, StrategyFailure> {
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(strategy.timeout(), strategy.fetch(url)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(StrategyError::Timeout(strategy.timeout())),
            };

            let error = match outcome {
                Ok(result) if result.is_usable() => return Ok(result),
                Ok(result) => StrategyError::Unusable(format!(
                    "status {} with {} byte body",
                    result.status_code,
                    result.body.len()
                )),
                Err(error) => error,
            };

            let failure = move |error: StrategyError| StrategyFailure {
                strategy: strategy.kind(),
                attempts: attempt,
                error,
            };

            if error.skips_strategy() {
                return Err(failure(error));
            }

            match self.retry.should_retry(error.failure_kind(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    tracing::debug!(
                        "{} attempt {} for {} failed: {}; retrying in {:?}",
                        strategy.kind(),
                        attempt,
                        url,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    tracing::debug!("Giving up on {} via {}: {}", url, strategy.kind(), reason);
                    return Err(failure(error));
                }
            }
        }
    }
}

/// Builds the crawler-identified HTTP client
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Example
///
/// ```no_run
/// use doc_harvester::config::UserAgentConfig;
/// use doc_harvester::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds an HTTP client that presents itself like a desktop browser
pub fn build_browser_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Whether a Content-Type should be decoded as text
pub(crate) fn is_textual(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.is_empty()
        || ct.starts_with("text/")
        || ct.contains("html")
        || ct.contains("xml")
        || ct.contains("json")
        || ct.contains("javascript")
}

/// Whether a response body is worth reading for links
///
/// Document types (plain text and CSV included) are handed to the downloader
/// without being buffered here.
fn reads_as_page(content_type: &str) -> bool {
    is_textual(content_type) && DocumentKind::from_mime(content_type).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted strategy returning queued outcomes, then repeating the last one
    struct ScriptedStrategy {
        kind: StrategyKind,
        outcomes: Mutex<Vec<Result<&'static str, StrategyError>>>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl ScriptedStrategy {
        fn new(kind: StrategyKind, outcomes: Vec<Result<&'static str, StrategyError>>) -> Self {
            Self {
                kind,
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FetchStrategy for ScriptedStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn fetch(&self, url: &Url) -> Result<FetchResult, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let next = {
                let mut outcomes = self.outcomes.lock().unwrap();
                if outcomes.len() > 1 {
                    outcomes.remove(0)
                } else {
                    outcomes[0].clone()
                }
            };
            next.map(|body| FetchResult {
                final_url: url.clone(),
                status_code: 200,
                content_type: "text/html".to_string(),
                body: PageBody::Text(body.to_string()),
                strategy_used: self.kind,
            })
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5), Duration::ZERO)
    }

    fn url() -> Url {
        Url::parse("https://example.com/docs").unwrap()
    }

    #[tokio::test]
    async fn test_first_usable_strategy_wins() {
        let primary = Arc::new(ScriptedStrategy::new(StrategyKind::Primary, vec![Ok("<html>a</html>")]));
        let fallback = Arc::new(ScriptedStrategy::new(StrategyKind::Static, vec![Ok("<html>b</html>")]));
        let fetcher = Fetcher::new(vec![primary.clone(), fallback.clone()], fast_retry(3));

        let result = fetcher.fetch(&url()).await.unwrap();
        assert_eq!(result.strategy_used, StrategyKind::Primary);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_skips_without_retry() {
        let primary = Arc::new(ScriptedStrategy::new(
            StrategyKind::Primary,
            vec![Err(StrategyError::Unavailable("connection refused".into()))],
        ));
        let fallback = Arc::new(ScriptedStrategy::new(StrategyKind::Static, vec![Ok("<html></html>")]));
        let fetcher = Fetcher::new(vec![primary.clone(), fallback.clone()], fast_retry(3));

        let result = fetcher.fetch(&url()).await.unwrap();
        assert_eq!(result.strategy_used, StrategyKind::Static);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retried_within_strategy() {
        let primary = Arc::new(ScriptedStrategy::new(
            StrategyKind::Primary,
            vec![
                Err(StrategyError::Http { status: 503 }),
                Err(StrategyError::Network("reset".into())),
                Ok("<html>ok</html>"),
            ],
        ));
        let fetcher = Fetcher::new(vec![primary.clone()], fast_retry(3));

        let result = fetcher.fetch(&url()).await.unwrap();
        assert_eq!(result.strategy_used, StrategyKind::Primary);
        assert_eq!(primary.calls(), 3);
    }

    #[tokio::test]
    async fn test_all_strategies_fail_reports_each() {
        let primary = Arc::new(ScriptedStrategy::new(
            StrategyKind::Primary,
            vec![Err(StrategyError::Blocked("captcha".into()))],
        ));
        let fallback = Arc::new(ScriptedStrategy::new(
            StrategyKind::Static,
            vec![Err(StrategyError::Http { status: 500 })],
        ));
        let fetcher = Fetcher::new(vec![primary, fallback.clone()], fast_retry(2));

        let err = fetcher.fetch(&url()).await.unwrap_err();
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].strategy, StrategyKind::Primary);
        assert_eq!(err.failures[1].attempts, 2);
        assert_eq!(fallback.calls(), 2);
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_permanent_status_not_retried() {
        let only = Arc::new(ScriptedStrategy::new(
            StrategyKind::Static,
            vec![Err(StrategyError::Http { status: 404 })],
        ));
        let fetcher = Fetcher::new(vec![only.clone()], fast_retry(5));
        assert!(fetcher.fetch(&url()).await.is_err());
        assert_eq!(only.calls(), 1);
    }

    #[tokio::test]
    async fn test_hanging_attempt_is_timed_out() {
        let mut slow = ScriptedStrategy::new(StrategyKind::Primary, vec![Ok("<html></html>")]);
        slow.delay = Duration::from_secs(5);
        let fetcher = Fetcher::new(vec![Arc::new(slow)], fast_retry(1));

        let err = fetcher.fetch(&url()).await.unwrap_err();
        assert!(matches!(err.failures[0].error, StrategyError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_empty_body_moves_on() {
        let primary = Arc::new(ScriptedStrategy::new(StrategyKind::Primary, vec![Ok("   ")]));
        let fallback = Arc::new(ScriptedStrategy::new(StrategyKind::Static, vec![Ok("<p>x</p>")]));
        let fetcher = Fetcher::new(vec![primary.clone(), fallback], fast_retry(3));

        let result = fetcher.fetch(&url()).await.unwrap();
        assert_eq!(result.strategy_used, StrategyKind::Static);
        assert_eq!(primary.calls(), 1);
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&UserAgentConfig::default(), Duration::from_secs(5)).is_ok());
        assert!(build_browser_client(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_chain_from_default_config() {
        let fetcher = Fetcher::from_config(&Config::default()).unwrap();
        assert_eq!(
            fetcher.strategy_kinds(),
            vec![StrategyKind::Fallback2, StrategyKind::Static]
        );
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual("text/html; charset=utf-8"));
        assert!(is_textual("application/xhtml+xml"));
        assert!(is_textual(""));
        assert!(!is_textual("application/pdf"));
    }

    #[test]
    fn test_reads_as_page() {
        assert!(reads_as_page("text/html; charset=utf-8"));
        assert!(reads_as_page(""));
        assert!(!reads_as_page("application/pdf"));
        assert!(!reads_as_page("text/plain"));
        assert!(!reads_as_page("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_document_body_left_unread() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0u8; 4 * 1024 * 1024], "application/pdf"),
            )
            .mount(&server)
            .await;

        let strategy =
            HttpStrategy::crawler(&UserAgentConfig::default(), Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/big.pdf", server.uri())).unwrap();
        let result = strategy.fetch(&url).await.unwrap();

        assert_eq!(result.body, PageBody::Unread);
        assert_eq!(result.content_type, "application/pdf");
        assert!(result.is_usable());
    }
}
