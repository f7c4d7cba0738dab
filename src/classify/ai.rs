//! External language-model classifier
//!
//! The crawl only ever talks to the model through [`ContentClassifier`], so
//! tests substitute a deterministic stub and the engine never depends on a
//! live model. [`OllamaClassifier`] is the production implementation,
//! speaking the Ollama `/api/generate` protocol with JSON-formatted output.

use crate::config::ClassifierConfig;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;

/// Longest context or snippet forwarded to the model, in characters
const MAX_CONTEXT_CHARS: usize = 1000;

/// Errors from the external classifier
///
/// Always soft: callers degrade to their rule-based default.
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("classifier unreachable: {0}")]
    Transport(String),

    #[error("unusable classifier response: {0}")]
    BadResponse(String),

    #[error("classifier disabled")]
    Disabled,
}

/// What the classifier is being asked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationTask {
    /// Is this link a navigable page, a document, or irrelevant?
    LinkNature,
    /// Which category does this document belong to?
    Category,
}

/// Input to a classification call
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub url: String,
    /// Link text, or a text snippet of the document
    pub context: String,
    pub task: ClassificationTask,
}

impl ClassificationRequest {
    pub fn link_nature(url: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            context: context.into(),
            task: ClassificationTask::LinkNature,
        }
    }

    pub fn category(url: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            context: context.into(),
            task: ClassificationTask::Category,
        }
    }
}

/// The classifier's judgement of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkVerdict {
    Page,
    Document,
    Irrelevant,
}

/// Structured classifier output
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierDecision {
    pub verdict: LinkVerdict,
    pub category: Option<String>,
    /// Reported confidence in [0, 1]
    pub confidence: f32,
}

/// Narrow capability interface to the external classifier
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierDecision, ClassificationError>;
}

/// Runs a classification bounded by `timeout`
pub async fn classify_bounded(
    classifier: &dyn ContentClassifier,
    request: &ClassificationRequest,
    timeout: Duration,
) -> Result<ClassifierDecision, ClassificationError> {
    match tokio::time::timeout(timeout, classifier.classify(request)).await {
        Ok(result) => result,
        Err(_) => Err(ClassificationError::Timeout(timeout)),
    }
}

/// Classifier backed by an Ollama-compatible server
pub struct OllamaClassifier {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout(),
        })
    }

    /// Builds the classifier when enabled in the configuration
    pub fn from_config(
        config: &ClassifierConfig,
    ) -> Result<Option<Arc<dyn ContentClassifier>>, reqwest::Error> {
        if !config.enabled {
            return Ok(None);
        }
        tracing::info!("Using classifier model {} at {}", config.model, config.base_url);
        Ok(Some(Arc::new(Self::new(config)?)))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Fields the prompts ask the model to return
#[derive(Debug, Default, Deserialize)]
struct RawDecision {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    is_document: Option<bool>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[async_trait]
impl ContentClassifier for OllamaClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierDecision, ClassificationError> {
        let body = json!({
            "model": self.model,
            "prompt": build_prompt(request),
            "stream": false,
            "format": "json",
            "options": { "temperature": self.temperature }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassificationError::Timeout(self.timeout)
                } else {
                    ClassificationError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ClassificationError::Transport(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClassificationError::BadResponse(e.to_string()))?;

        let decision = parse_decision(&generated.response, request.task)?;
        tracing::debug!(
            "Classifier: {} -> {:?} ({:?}, {:.2})",
            request.url,
            decision.verdict,
            decision.category,
            decision.confidence
        );
        Ok(decision)
    }
}

fn build_prompt(request: &ClassificationRequest) -> String {
    let context = truncate_chars(request.context.trim(), MAX_CONTEXT_CHARS);
    let context = if context.is_empty() { "(none)" } else { context };

    match request.task {
        ClassificationTask::LinkNature => format!(
            "You decide whether a hyperlink leads to a downloadable document \
             (PDF, Word, PowerPoint, Excel, OpenDocument, text or similar file), \
             a navigable web page, or something irrelevant (login, ads, social media).\n\
             URL: {}\nLink text: {}\n\
             Answer with JSON only: {{\"kind\": \"document\" | \"page\" | \"irrelevant\", \
             \"category\": \"<short snake_case category if a document>\", \
             \"confidence\": <0.0-1.0>}}",
            request.url, context
        ),
        ClassificationTask::Category => format!(
            "Categorize this document into one of: academic_papers, technical_docs, \
             business_documents, legal_documents, educational_materials, reports, \
             presentations, datasets, multimedia, source_code, other.\n\
             URL: {}\nContent preview: {}\n\
             Answer with JSON only: {{\"category\": \"<name>\", \"confidence\": <0.0-1.0>}}",
            request.url, context
        ),
    }
}

fn json_object_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()
}

/// Parses the model's text into a decision
///
/// Models sometimes wrap the JSON in prose, so the outermost object is
/// located first.
fn parse_decision(
    text: &str,
    task: ClassificationTask,
) -> Result<ClassifierDecision, ClassificationError> {
    let object = json_object_re()
        .and_then(|re| re.find(text))
        .ok_or_else(|| ClassificationError::BadResponse(format!("no JSON object in {:?}", text)))?;
    let raw: RawDecision = serde_json::from_str(object.as_str())
        .map_err(|e| ClassificationError::BadResponse(e.to_string()))?;

    let verdict = match task {
        ClassificationTask::Category => LinkVerdict::Document,
        ClassificationTask::LinkNature => match (raw.kind.as_deref(), raw.is_document) {
            (Some(kind), _) => match kind.trim().to_ascii_lowercase().as_str() {
                "document" | "doc" | "file" => LinkVerdict::Document,
                "page" | "webpage" | "navigable" => LinkVerdict::Page,
                "irrelevant" | "skip" | "none" => LinkVerdict::Irrelevant,
                other => {
                    return Err(ClassificationError::BadResponse(format!(
                        "unknown link kind {:?}",
                        other
                    )))
                }
            },
            (None, Some(true)) => LinkVerdict::Document,
            (None, Some(false)) => LinkVerdict::Page,
            (None, None) => {
                return Err(ClassificationError::BadResponse(
                    "response names no link kind".to_string(),
                ))
            }
        },
    };

    if task == ClassificationTask::Category && raw.category.is_none() {
        return Err(ClassificationError::BadResponse(
            "response names no category".to_string(),
        ));
    }

    Ok(ClassifierDecision {
        verdict,
        category: raw.category.filter(|c| !c.trim().is_empty()),
        confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
    })
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
