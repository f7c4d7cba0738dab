//! Document categorization
//!
//! Assigns each document a category with a fixed precedence:
//!
//! 1. Filename keyword or category-specific extension (confidence 0.9)
//! 2. Keyword in the URL's directories or query (confidence 0.6)
//! 3. The classifier: a category suggested while judging the link, or a
//!    fresh call with a content snippet (reported confidence)
//! 4. `other` (confidence 0.0)
//!
//! Categorization never fails. A classifier error is logged and the next
//! tier applies.

pub mod ai;

pub use ai::{
    classify_bounded, ClassificationError, ClassificationRequest, ClassificationTask,
    ClassifierDecision, ContentClassifier, LinkVerdict, OllamaClassifier,
};

use crate::document::{DocumentCandidate, DocumentKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Category assigned when every other tier fails
pub const DEFAULT_CATEGORY: &str = "other";

const FILENAME_CONFIDENCE: f32 = 0.9;
const URL_KEYWORD_CONFIDENCE: f32 = 0.6;

/// Keyword rules in precedence order
const KEYWORD_RULES: &[(&str, &[&str])] = &[
    ("syllabus", &["syllabus", "cbcs", "structure", "regulation", "curriculum"]),
    ("question_papers", &["question", "paper", "model", "qp", "blueprint"]),
    (
        "academic_papers",
        &["thesis", "dissertation", "journal", "research", "proceedings", "preprint"],
    ),
    (
        "technical_docs",
        &["manual", "guide", "specification", "datasheet", "handbook", "tutorial"],
    ),
    ("reports", &["report", "whitepaper", "annual", "review"]),
    (
        "business_documents",
        &["invoice", "contract", "proposal", "financial", "budget", "tender"],
    ),
    (
        "legal_documents",
        &["law", "act", "legal", "gazette", "circular", "notification", "policy"],
    ),
];

/// Which tier produced a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    FilenameRule,
    UrlKeyword,
    Classifier,
    Default,
}

/// Result of categorizing a document
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub category: String,
    pub confidence: f32,
    pub source: CategorySource,
}

impl Categorization {
    fn new(category: impl Into<String>, confidence: f32, source: CategorySource) -> Self {
        Self {
            category: category.into(),
            confidence,
            source,
        }
    }

    fn fallback() -> Self {
        Self::new(DEFAULT_CATEGORY, 0.0, CategorySource::Default)
    }
}

/// Rule-first categorizer with an optional classifier tier
#[derive(Clone)]
pub struct Categorizer {
    classifier: Option<Arc<dyn ContentClassifier>>,
    timeout: Duration,
}

impl Categorizer {
    pub fn new(classifier: Option<Arc<dyn ContentClassifier>>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    /// A categorizer that only applies the rule tiers
    pub fn rules_only() -> Self {
        Self::new(None, Duration::ZERO)
    }

    /// Assigns a category to a document
    ///
    /// # Arguments
    ///
    /// * `candidate` - The document; its URL, link text and any suggested category are used
    /// * `snippet` - Leading text of the content, when it could be read
    pub async fn categorize(
        &self,
        candidate: &DocumentCandidate,
        snippet: Option<&str>,
    ) -> Categorization {
        let Ok(url) = Url::parse(&candidate.url) else {
            return Categorization::fallback();
        };

        if let Some(found) = categorize_by_rules(&url, candidate.inferred_type) {
            return found;
        }

        if let Some(category) = candidate
            .suggested_category
            .as_deref()
            .and_then(sanitize_category)
        {
            return Categorization::new(category, candidate.confidence, CategorySource::Classifier);
        }

        if let Some(classifier) = &self.classifier {
            let mut context = candidate.context.clone();
            if let Some(snippet) = snippet {
                if !context.is_empty() {
                    context.push('\n');
                }
                context.push_str(snippet);
            }
            let request = ClassificationRequest::category(candidate.url.as_str(), context);
            match classify_bounded(classifier.as_ref(), &request, self.timeout).await {
                Ok(decision) => {
                    if let Some(category) = decision.category.as_deref().and_then(sanitize_category)
                    {
                        return Categorization::new(
                            category,
                            decision.confidence,
                            CategorySource::Classifier,
                        );
                    }
                }
                Err(e) => {
                    tracing::debug!("Categorization of {} fell back to default: {}", candidate.url, e);
                }
            }
        }

        Categorization::fallback()
    }
}

/// Applies the two rule tiers
pub fn categorize_by_rules(url: &Url, kind: DocumentKind) -> Option<Categorization> {
    let segments: Vec<String> = url
        .path_segments()
        .map(|s| {
            s.filter(|seg| !seg.is_empty())
                .map(|seg| {
                    urlencoding::decode(seg)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| seg.to_string())
                        .to_lowercase()
                })
                .collect()
        })
        .unwrap_or_default();

    let (filename, directories) = match segments.split_last() {
        Some((last, rest)) => (last.as_str(), rest),
        None => ("", &[][..]),
    };

    if let Some(category) = match_keywords(&tokens(filename)) {
        return Some(Categorization::new(
            category,
            FILENAME_CONFIDENCE,
            CategorySource::FilenameRule,
        ));
    }

    let by_kind = match kind {
        DocumentKind::Ppt | DocumentKind::Pptx | DocumentKind::Odp => Some("presentations"),
        DocumentKind::Xls | DocumentKind::Xlsx | DocumentKind::Ods | DocumentKind::Csv => {
            Some("datasets")
        }
        _ => None,
    };
    if let Some(category) = by_kind {
        return Some(Categorization::new(
            category,
            FILENAME_CONFIDENCE,
            CategorySource::FilenameRule,
        ));
    }

    let mut url_tokens: Vec<String> = directories.iter().flat_map(|d| tokens(d)).collect();
    if let Some(query) = url.query() {
        url_tokens.extend(tokens(&query.to_lowercase()));
    }
    match_keywords(&url_tokens)
        .map(|category| Categorization::new(category, URL_KEYWORD_CONFIDENCE, CategorySource::UrlKeyword))
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// First rule with a keyword matching any token
///
/// Short keywords must match a whole token; longer ones may prefix it, so
/// `reports` and `questions` still match.
fn match_keywords(tokens: &[String]) -> Option<&'static str> {
    KEYWORD_RULES.iter().find_map(|(category, keywords)| {
        let hit = tokens.iter().any(|token| {
            keywords.iter().any(|kw| {
                if kw.len() < 5 {
                    token == kw || token.strip_suffix('s') == Some(kw)
                } else {
                    token.starts_with(kw)
                }
            })
        });
        hit.then_some(*category)
    })
}

/// Normalizes a category name to lowercase `[a-z0-9_]`
///
/// Returns `None` when nothing usable remains.
pub fn sanitize_category(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DetectionSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedClassifier {
        result: Result<ClassifierDecision, ClassificationError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentClassifier for FixedClassifier {
        async fn classify(
            &self,
            _request: &ClassificationRequest,
        ) -> Result<ClassifierDecision, ClassificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn candidate(url: &str) -> DocumentCandidate {
        let parsed = Url::parse(url).unwrap();
        let kind = DocumentKind::from_url(&parsed).unwrap_or(DocumentKind::Unknown);
        DocumentCandidate::new(url, kind, DetectionSource::Extension, 0.95)
    }

    fn with_classifier(result: Result<ClassifierDecision, ClassificationError>) -> (Categorizer, Arc<FixedClassifier>) {
        let classifier = Arc::new(FixedClassifier {
            result,
            calls: AtomicU32::new(0),
        });
        (
            Categorizer::new(Some(classifier.clone()), Duration::from_secs(1)),
            classifier,
        )
    }

    #[tokio::test]
    async fn test_filename_rule_wins() {
        let c = Categorizer::rules_only()
            .categorize(&candidate("https://uni.edu/files/BSc_Syllabus_2024.pdf"), None)
            .await;
        assert_eq!(c.category, "syllabus");
        assert_eq!(c.confidence, 0.9);
        assert_eq!(c.source, CategorySource::FilenameRule);
    }

    #[tokio::test]
    async fn test_extension_rule() {
        let c = Categorizer::rules_only()
            .categorize(&candidate("https://e.com/x/lecture3.pptx"), None)
            .await;
        assert_eq!(c.category, "presentations");
    }

    #[tokio::test]
    async fn test_url_keyword_tier() {
        let c = Categorizer::rules_only()
            .categorize(&candidate("https://e.com/annual-reports/2023/summary.pdf"), None)
            .await;
        assert_eq!(c.category, "reports");
        assert_eq!(c.confidence, 0.6);
        assert_eq!(c.source, CategorySource::UrlKeyword);
    }

    #[tokio::test]
    async fn test_suggested_category_used_before_calling() {
        let (categorizer, classifier) = with_classifier(Err(ClassificationError::Disabled));
        let c = categorizer
            .categorize(
                &candidate("https://e.com/docs/notes").with_suggested_category(Some("Text".into())),
                None,
            )
            .await;
        assert_eq!(c.category, "text");
        assert_eq!(c.source, CategorySource::Classifier);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classifier_tier() {
        let (categorizer, _) = with_classifier(Ok(ClassifierDecision {
            verdict: LinkVerdict::Document,
            category: Some("educational materials".into()),
            confidence: 0.7,
        }));
        let c = categorizer
            .categorize(&candidate("https://e.com/d/x1.pdf"), Some("Chapter 1"))
            .await;
        assert_eq!(c.category, "educational_materials");
        assert_eq!(c.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_classifier_failure_degrades_to_other() {
        let (categorizer, classifier) =
            with_classifier(Err(ClassificationError::Transport("refused".into())));
        let c = categorizer.categorize(&candidate("https://e.com/d/x1.pdf"), None).await;
        assert_eq!(c.category, DEFAULT_CATEGORY);
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.source, CategorySource::Default);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_short_keywords_match_whole_tokens() {
        let url = Url::parse("https://e.com/contact/factsheet.pdf").unwrap();
        assert!(categorize_by_rules(&url, DocumentKind::Pdf).is_none());

        let url = Url::parse("https://e.com/files/QP_2022.pdf").unwrap();
        assert_eq!(
            categorize_by_rules(&url, DocumentKind::Pdf).unwrap().category,
            "question_papers"
        );
    }

    #[test]
    fn test_sanitize_category() {
        assert_eq!(sanitize_category(" Legal Documents "), Some("legal_documents".into()));
        assert_eq!(sanitize_category("../etc/passwd"), Some("etc_passwd".into()));
        assert_eq!(sanitize_category("--"), None);
    }
}
