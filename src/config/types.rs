use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Doc-Harvester
///
/// Every section is optional in the TOML file; missing values fall back to
/// the defaults below so a run with no configuration file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub fetch: FetchConfig,
    pub browser: BrowserConfig,
    pub classifier: ClassifierConfig,
    pub download: DownloadConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub filters: FilterConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of link-following hops from a seed URL
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Minimum time between two fetches to the same host (seconds)
    #[serde(rename = "delay-secs")]
    pub delay_secs: f64,

    /// Number of processed work items between progress snapshots
    #[serde(rename = "checkpoint-interval")]
    pub checkpoint_interval: u32,

    /// Upper bound on pages processed in one run
    #[serde(rename = "max-pages")]
    pub max_pages: Option<u64>,

    /// How long in-flight work may run after cancellation (seconds)
    #[serde(rename = "cancel-grace-secs")]
    pub cancel_grace_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            delay_secs: 1.0,
            checkpoint_interval: 1,
            max_pages: None,
            cancel_grace_secs: 5,
        }
    }
}

impl CrawlerConfig {
    /// The inter-request delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs.max(0.0))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }
}

/// Retry and backoff settings shared by the fetcher and the downloader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per operation, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds); doubles per attempt
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Cap on a single backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay (milliseconds)
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

/// Page fetching configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Timeout for a single static HTTP attempt (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Timeout for a single browser rendering attempt (seconds)
    #[serde(rename = "render-timeout-secs")]
    pub render_timeout_secs: u64,

    /// Try an HTTP request with desktop browser headers before the plain crawler request
    #[serde(rename = "browser-profile-http")]
    pub browser_profile_http: bool,

    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            render_timeout_secs: 45,
            browser_profile_http: true,
            retry: RetryConfig::default(),
        }
    }
}

/// Which browser a WebDriver endpoint drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserFlavor {
    #[default]
    Chrome,
    Firefox,
}

/// A WebDriver endpoint used as a rendering strategy
#[derive(Debug, Clone, Deserialize)]
pub struct WebDriverEndpoint {
    /// Base URL of the driver, e.g. "http://localhost:9515"
    pub url: String,

    #[serde(default)]
    pub flavor: BrowserFlavor,
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// First rendering strategy in the fetch chain
    pub primary: Option<WebDriverEndpoint>,

    /// Second rendering strategy, tried when the first is unavailable or blocked
    pub fallback: Option<WebDriverEndpoint>,

    pub headless: bool,

    /// Time to let client-side scripts settle after navigation (milliseconds)
    #[serde(rename = "settle-ms")]
    pub settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            primary: None,
            fallback: None,
            headless: true,
            settle_ms: 1500,
        }
    }
}

/// External language-model classifier configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,

    /// Base URL of the Ollama-compatible server
    #[serde(rename = "base-url")]
    pub base_url: String,

    pub model: String,

    pub temperature: f32,

    /// Timeout for a single classifier call (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Ambiguous links per page sent to the classifier; the rest default to pages
    #[serde(rename = "max-candidates-per-page")]
    pub max_candidates_per_page: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434".to_string(),
            model: "gpt-oss:20b".to_string(),
            temperature: 0.1,
            timeout_secs: 20,
            max_candidates_per_page: 25,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Document download configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Timeout for a single download attempt (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Largest accepted document body (bytes)
    #[serde(rename = "max-bytes")]
    pub max_bytes: u64,

    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_bytes: 100 * 1024 * 1024,
            retry: RetryConfig::default(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "DocHarvester".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/doc-harvester".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root of the data tree (raw/ and organized/ live beneath it)
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Progress snapshot file; defaults to <data-dir>/progress.json
    #[serde(rename = "snapshot-path")]
    pub snapshot_path: Option<PathBuf>,

    /// Final JSON report; defaults to <data-dir>/final_report.json
    #[serde(rename = "report-path")]
    pub report_path: Option<PathBuf>,

    /// Optional markdown summary
    #[serde(rename = "summary-path")]
    pub summary_path: Option<PathBuf>,

    /// Optional SQLite catalog of documents, pages and failures
    #[serde(rename = "catalog-path")]
    pub catalog_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            snapshot_path: None,
            report_path: None,
            summary_path: None,
            catalog_path: None,
        }
    }
}

impl OutputConfig {
    /// Staging area for in-progress downloads
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Category-partitioned tree of accepted documents
    pub fn organized_dir(&self) -> PathBuf {
        self.data_dir.join("organized")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("progress.json"))
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("final_report.json"))
    }
}

/// Link filtering configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Substrings that mark a link as irrelevant
    #[serde(rename = "skip-patterns")]
    pub skip_patterns: Vec<String>,

    /// Domain patterns (e.g., "ads.example.com" or "*.tracker.net") never contacted
    #[serde(rename = "exclude-domains")]
    pub exclude_domains: Vec<String>,

    /// When non-empty, only pages on these domain patterns are followed
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            skip_patterns: [
                "/wp-json/",
                "/feed/",
                "oembed",
                "trackback",
                "/xmlrpc.php",
                "/wp-login.php",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_domains: Vec::new(),
            allowed_domains: Vec::new(),
        }
    }
}
