//! Link and document extraction
//!
//! Turns a [`FetchResult`] into the links worth following and the documents
//! worth downloading. Three passes:
//!
//! 1. Syntactic: the parser's links are judged by extension, path shape,
//!    skip patterns and the `download` attribute.
//! 2. Content-type: a page that was itself served as a document becomes a
//!    candidate and yields no links.
//! 3. Ambiguity: links the syntactic pass cannot judge go to the classifier,
//!    whose verdict is final. On error, timeout, or beyond the per-page cap
//!    they are treated as navigable pages.

use crate::classify::{
    classify_bounded, ClassificationError, ClassificationRequest, ClassifierDecision,
    ContentClassifier, LinkVerdict,
};
use crate::config::{ClassifierConfig, FilterConfig};
use crate::crawler::fetcher::{FetchResult, PageBody};
use crate::crawler::parser::{parse_html, LinkOrigin, LinkRef};
use crate::document::{url_extension, DetectionSource, DocumentCandidate, DocumentKind};
use crate::url::{domain_scope, extract_domain, normalize_parsed, DomainScope};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Confidence of a document recognized by its extension
pub const EXTENSION_CONFIDENCE: f32 = 0.95;
/// Confidence of a link marked with the `download` attribute
const DOWNLOAD_ATTR_CONFIDENCE: f32 = 0.8;
/// Confidence of a resource served with a document Content-Type
const CONTENT_TYPE_CONFIDENCE: f32 = 1.0;

const PAGE_EXTENSIONS: &[&str] = &[
    "html", "htm", "xhtml", "shtml", "php", "asp", "aspx", "jsp", "cfm",
];

/// Extensions of resources that are neither pages nor documents
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "ico", "svg", "webp", "bmp", "woff",
    "woff2", "ttf", "eot", "otf", "mp4", "mp3", "webm", "ogg", "wav", "avi", "mov", "json", "xml",
    "rss", "atom",
];

/// Query keys or values suggesting a page URL serves a file
const DOWNLOAD_HINTS: &[&str] = &["download", "file", "attachment", "doc", "getfile"];

/// Syntactic judgement of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkNature {
    Page,
    Document(DocumentKind),
    Ambiguous,
    Irrelevant,
}

/// Output of extracting one fetched page
#[derive(Debug, Default)]
pub struct Extraction {
    pub title: Option<String>,
    /// Normalized page URLs allowed to be followed, in document order
    pub links: Vec<Url>,
    pub documents: Vec<DocumentCandidate>,
    /// Classifier calls that failed and defaulted to page
    pub classification_failures: Vec<(String, ClassificationError)>,
}

/// Extracts links and document candidates from fetched content
pub struct Extractor {
    classifier: Option<Arc<dyn ContentClassifier>>,
    timeout: Duration,
    max_ai_per_page: usize,
    filters: FilterConfig,
    /// Verdicts already obtained this run, keyed by normalized URL
    verdicts: Mutex<HashMap<String, ClassifierDecision>>,
}

impl Extractor {
    pub fn new(
        classifier: Option<Arc<dyn ContentClassifier>>,
        classifier_config: &ClassifierConfig,
        filters: FilterConfig,
    ) -> Self {
        Self {
            classifier,
            timeout: classifier_config.timeout(),
            max_ai_per_page: classifier_config.max_candidates_per_page,
            filters,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// Extracts links and documents from a fetch result
    ///
    /// All URLs are resolved against the final URL and normalized. Links on
    /// excluded domains are dropped; pages outside `allowed-domains` are not
    /// returned but documents found there still are.
    pub async fn extract(&self, fetched: &FetchResult) -> Extraction {
        let page_url = fetched.final_url.as_str().to_string();

        if let Some(kind) = served_as_document(fetched) {
            tracing::debug!("{} was served as a {} document", page_url, kind);
            let candidate = DocumentCandidate::new(
                page_url.clone(),
                kind,
                DetectionSource::ContentType,
                CONTENT_TYPE_CONFIDENCE,
            );
            return Extraction {
                documents: vec![candidate],
                ..Extraction::default()
            };
        }

        let Some(html) = fetched.body.as_text() else {
            return Extraction::default();
        };

        let parsed = parse_html(html, &fetched.final_url);
        let mut extraction = Extraction {
            title: parsed.title,
            ..Extraction::default()
        };

        let mut seen_links: HashSet<String> = HashSet::new();
        let mut seen_docs: HashSet<String> = HashSet::new();
        let mut ai_calls = 0usize;

        for link in parsed.links {
            let Ok(url) = normalize_parsed(link.url.clone()) else {
                continue;
            };
            let Some(domain) = extract_domain(&url) else {
                continue;
            };
            let scope = domain_scope(&domain, &self.filters);
            if scope == DomainScope::Excluded {
                continue;
            }

            let nature = match self.syntactic_nature(&url, &link) {
                LinkNature::Ambiguous => {
                    match self
                        .resolve_ambiguous(&url, &link, &mut ai_calls, &mut extraction)
                        .await
                    {
                        Resolved::Document(candidate) => {
                            if seen_docs.insert(candidate.url.clone()) {
                                extraction
                                    .documents
                                    .push(candidate.with_found_on(page_url.as_str()));
                            }
                            continue;
                        }
                        Resolved::Page => LinkNature::Page,
                        Resolved::Irrelevant => LinkNature::Irrelevant,
                    }
                }
                other => other,
            };

            match nature {
                LinkNature::Document(kind) => {
                    if !seen_docs.insert(url.as_str().to_string()) {
                        continue;
                    }
                    let (source, confidence) = if link.origin == LinkOrigin::Script {
                        (DetectionSource::JavascriptExtraction, EXTENSION_CONFIDENCE)
                    } else if kind == DocumentKind::Unknown {
                        (DetectionSource::Extension, DOWNLOAD_ATTR_CONFIDENCE)
                    } else {
                        (DetectionSource::Extension, EXTENSION_CONFIDENCE)
                    };
                    extraction.documents.push(
                        DocumentCandidate::new(url.as_str(), kind, source, confidence)
                            .with_context(link.text.as_str())
                            .with_found_on(page_url.as_str()),
                    );
                }
                LinkNature::Page => {
                    if scope.may_follow() && seen_links.insert(url.as_str().to_string()) {
                        extraction.links.push(url);
                    }
                }
                LinkNature::Irrelevant | LinkNature::Ambiguous => {}
            }
        }

        tracing::debug!(
            "Extracted {} links and {} documents from {}",
            extraction.links.len(),
            extraction.documents.len(),
            page_url
        );
        extraction
    }

    /// Judges a link from its URL and markup alone
    pub fn syntactic_nature(&self, url: &Url, link: &LinkRef) -> LinkNature {
        let lowered = url.as_str().to_ascii_lowercase();
        if self
            .filters
            .skip_patterns
            .iter()
            .any(|p| lowered.contains(&p.to_ascii_lowercase()))
        {
            return LinkNature::Irrelevant;
        }

        let extension = url_extension(url);
        if let Some(kind) = extension.as_deref().and_then(DocumentKind::from_extension) {
            return LinkNature::Document(kind);
        }
        if link.download_attr {
            return LinkNature::Document(DocumentKind::Unknown);
        }

        match extension.as_deref() {
            Some(ext) if ASSET_EXTENSIONS.contains(&ext) => LinkNature::Irrelevant,
            Some(ext) if PAGE_EXTENSIONS.contains(&ext) => {
                if has_download_hint(url) {
                    LinkNature::Ambiguous
                } else {
                    LinkNature::Page
                }
            }
            Some(_) => LinkNature::Ambiguous,
            None if url.path().ends_with('/') => {
                if has_download_hint(url) {
                    LinkNature::Ambiguous
                } else {
                    LinkNature::Page
                }
            }
            // Forms and refreshes navigate; they never name a file
            None if matches!(link.origin, LinkOrigin::Form | LinkOrigin::MetaRefresh) => {
                LinkNature::Page
            }
            None => LinkNature::Ambiguous,
        }
    }

    /// Escalates an ambiguous link to the classifier
    async fn resolve_ambiguous(
        &self,
        url: &Url,
        link: &LinkRef,
        ai_calls: &mut usize,
        extraction: &mut Extraction,
    ) -> Resolved {
        let Some(classifier) = self.classifier.as_ref() else {
            return Resolved::Page;
        };

        let cached = self
            .verdicts
            .lock()
            .ok()
            .and_then(|cache| cache.get(url.as_str()).cloned());

        let outcome = match cached {
            Some(decision) => Ok(decision),
            None => {
                if *ai_calls >= self.max_ai_per_page {
                    tracing::trace!("Classifier budget spent, {} treated as page", url);
                    return Resolved::Page;
                }
                *ai_calls += 1;
                let request = ClassificationRequest::link_nature(url.as_str(), link.text.as_str());
                let outcome = classify_bounded(classifier.as_ref(), &request, self.timeout).await;
                if let (Ok(decision), Ok(mut cache)) = (&outcome, self.verdicts.lock()) {
                    cache.insert(url.as_str().to_string(), decision.clone());
                }
                outcome
            }
        };

        match outcome {
            Ok(decision) => match decision.verdict {
                LinkVerdict::Document => {
                    let kind = DocumentKind::from_url(url).unwrap_or(DocumentKind::Unknown);
                    Resolved::Document(
                        DocumentCandidate::new(
                            url.as_str(),
                            kind,
                            DetectionSource::Ai,
                            decision.confidence,
                        )
                        .with_context(link.text.as_str())
                        .with_suggested_category(decision.category),
                    )
                }
                LinkVerdict::Page => Resolved::Page,
                LinkVerdict::Irrelevant => {
                    tracing::debug!("Classifier marked {} irrelevant", url);
                    Resolved::Irrelevant
                }
            },
            Err(e) => {
                tracing::warn!("Classifier failed for {}, treating as page: {}", url, e);
                extraction
                    .classification_failures
                    .push((url.as_str().to_string(), e));
                Resolved::Page
            }
        }
    }
}

/// Outcome of escalating an ambiguous link
enum Resolved {
    Document(DocumentCandidate),
    Page,
    Irrelevant,
}

/// Kind of the fetched resource when it was served as a document
fn served_as_document(fetched: &FetchResult) -> Option<DocumentKind> {
    if let Some(kind) = DocumentKind::from_mime(&fetched.content_type) {
        return Some(kind);
    }
    match &fetched.body {
        PageBody::Unread => {
            DocumentKind::from_url(&fetched.final_url).or(Some(DocumentKind::Unknown))
        }
        PageBody::Text(_) => None,
    }
}

fn has_download_hint(url: &Url) -> bool {
    url.query_pairs().any(|(key, value)| {
        let key = key.to_ascii_lowercase();
        let value = value.to_ascii_lowercase();
        DOWNLOAD_HINTS
            .iter()
            .any(|hint| key.contains(hint) || value == *hint)
    })
}
