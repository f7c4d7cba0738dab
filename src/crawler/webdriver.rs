//! Headless browser rendering over the W3C WebDriver protocol
//!
//! Talks to a running chromedriver or geckodriver. Each fetch opens one
//! session, navigates, scrolls to trigger lazy content, waits for scripts to
//! settle, reads the rendered source, and deletes the session.
//!
//! Sessions are released on every path. The happy and error paths close
//! explicitly; if the attempt future is dropped mid-flight (timeout or
//! cancellation), the guard's `Drop` spawns the DELETE onto the runtime.

use crate::config::{BrowserConfig, BrowserFlavor, WebDriverEndpoint};
use crate::crawler::fetcher::{FetchResult, FetchStrategy, PageBody, StrategyError, StrategyKind};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Markers of anti-bot interstitials in rendered pages
const BLOCK_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "cf-chl-",
    "g-recaptcha",
    "h-captcha",
    "verify you are human",
    "access denied",
    "attention required! | cloudflare",
];

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0);";

/// Rendering strategy backed by a WebDriver endpoint
pub struct WebDriverStrategy {
    client: Client,
    endpoint: String,
    kind: StrategyKind,
    capabilities: Value,
    settle: Duration,
    timeout: Duration,
}

impl WebDriverStrategy {
    pub fn new(
        kind: StrategyKind,
        endpoint: &WebDriverEndpoint,
        browser: &BrowserConfig,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.url.trim_end_matches('/').to_string(),
            kind,
            capabilities: capabilities(endpoint.flavor, browser.headless),
            settle: Duration::from_millis(browser.settle_ms),
            timeout,
        })
    }

    async fn open_session(&self) -> Result<Session, StrategyError> {
        let response = self
            .client
            .post(format!("{}/session", self.endpoint))
            .json(&json!({ "capabilities": { "alwaysMatch": self.capabilities } }))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    StrategyError::Unavailable(format!("driver at {}: {}", self.endpoint, e))
                } else {
                    StrategyError::from_reqwest(e, self.timeout)
                }
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| StrategyError::Protocol(format!("session response: {}", e)))?;

        if !status.is_success() {
            return Err(StrategyError::Unavailable(driver_error_message(&body)));
        }

        let id = body
            .pointer("/value/sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| StrategyError::Protocol("session response without sessionId".into()))?;

        tracing::trace!("Opened {} session {}", self.kind, id);

        Ok(Session {
            client: self.client.clone(),
            url: format!("{}/session/{}", self.endpoint, id),
            closed: false,
        })
    }

    async fn render(&self, session: &Session, url: &Url) -> Result<FetchResult, StrategyError> {
        session
            .command(reqwest::Method::POST, "url", Some(json!({ "url": url.as_str() })))
            .await?;

        // Lazy-loaded content only appears once scrolled into view
        let scrolled = session
            .command(
                reqwest::Method::POST,
                "execute/sync",
                Some(json!({ "script": SCROLL_SCRIPT, "args": [] })),
            )
            .await;
        if let Err(e) = scrolled {
            tracing::debug!("Scroll script failed on {}: {}", url, e);
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let current = session.command(reqwest::Method::GET, "url", None).await?;
        let final_url = current
            .as_str()
            .and_then(|s| Url::parse(s).ok())
            .unwrap_or_else(|| url.clone());

        let source = session.command(reqwest::Method::GET, "source", None).await?;
        let html = source
            .as_str()
            .ok_or_else(|| StrategyError::Protocol("page source was not a string".into()))?
            .to_string();

        if let Some(marker) = block_marker(&html) {
            return Err(StrategyError::Blocked(format!("{} ({})", url, marker)));
        }

        Ok(FetchResult {
            final_url,
            status_code: 200,
            content_type: "text/html".to_string(),
            body: PageBody::Text(html),
            strategy_used: self.kind,
        })
    }
}

#[async_trait]
impl FetchStrategy for WebDriverStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &Url) -> Result<FetchResult, StrategyError> {
        let session = self.open_session().await?;
        let result = self.render(&session, url).await;
        session.close().await;
        result
    }
}

/// An open WebDriver session, deleted on close or drop
struct Session {
    client: Client,
    url: String,
    closed: bool,
}

impl Session {
    /// Sends a session command and returns its `value`
    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, StrategyError> {
        let mut request = self
            .client
            .request(method, format!("{}/{}", self.url, path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StrategyError::Network(format!("driver command {}: {}", path, e)))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| StrategyError::Protocol(format!("driver command {}: {}", path, e)))?;

        if !status.is_success() {
            return Err(classify_driver_error(&payload));
        }

        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.client.delete(&self.url).send().await {
            tracing::warn!("Failed to delete browser session {}: {}", self.url, e);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let client = self.client.clone();
        let url = std::mem::take(&mut self.url);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.delete(&url).send().await {
                        tracing::warn!("Failed to delete abandoned browser session {}: {}", url, e);
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime to release browser session {}", url),
        }
    }
}

/// W3C capabilities for the configured browser
fn capabilities(flavor: BrowserFlavor, headless: bool) -> Value {
    match flavor {
        BrowserFlavor::Chrome => {
            let mut args = vec![
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--disable-blink-features=AutomationControlled",
                "--window-size=1366,900",
            ];
            if headless {
                args.insert(0, "--headless=new");
            }
            json!({
                "browserName": "chrome",
                "pageLoadStrategy": "normal",
                "goog:chromeOptions": { "args": args }
            })
        }
        BrowserFlavor::Firefox => {
            let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
            json!({
                "browserName": "firefox",
                "pageLoadStrategy": "normal",
                "moz:firefoxOptions": { "args": args }
            })
        }
    }
}

fn driver_error_message(payload: &Value) -> String {
    let error = payload
        .pointer("/value/error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = payload
        .pointer("/value/message")
        .and_then(Value::as_str)
        .unwrap_or("");
    format!("{}: {}", error, message.lines().next().unwrap_or(""))
}

fn classify_driver_error(payload: &Value) -> StrategyError {
    let error = payload
        .pointer("/value/error")
        .and_then(Value::as_str)
        .unwrap_or("");
    let message = driver_error_message(payload);
    match error {
        "timeout" | "script timeout" => StrategyError::Network(message),
        "invalid session id" | "session not created" => StrategyError::Unavailable(message),
        _ if message.contains("ERR_NAME_NOT_RESOLVED")
            || message.contains("ERR_CONNECTION")
            || message.contains("NS_ERROR") =>
        {
            StrategyError::Network(message)
        }
        _ => StrategyError::Protocol(message),
    }
}

fn block_marker(html: &str) -> Option<&'static str> {
    // Only the head of the document, real pages may mention these words later
    let head: String = html.chars().take(4096).collect::<String>().to_lowercase();
    BLOCK_MARKERS.iter().copied().find(|m| head.contains(m))
}
