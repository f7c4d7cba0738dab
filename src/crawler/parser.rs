//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links from anchors, embeds, frames, forms, data attributes and meta refresh
//! - URLs assigned or passed to navigation calls inside inline scripts
//! - The page title
//!
//! Relative references resolve against `<base href>` when the page declares one.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

/// Where on the page a link was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkOrigin {
    /// `<a href>` or `<area href>`
    Anchor,
    /// `<link href>`
    LinkTag,
    /// iframe, frame, embed or object
    Embedded,
    /// `<form action>`
    Form,
    /// data-href, data-url and similar attributes
    DataAttribute,
    /// `<meta http-equiv="refresh">`
    MetaRefresh,
    /// Inline script text
    Script,
}

/// A link discovered on a page
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRef {
    /// Absolute URL (not yet normalized)
    pub url: Url,
    /// Anchor text, title or aria-label; empty when nothing is available
    pub text: String,
    pub origin: LinkOrigin,
    /// The element carried a `download` attribute
    pub download_attr: bool,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Links in document order, one entry per distinct URL
    pub links: Vec<LinkRef>,
}

/// Element/attribute pairs scanned for links
const ATTRIBUTE_SOURCES: &[(&str, &str, LinkOrigin)] = &[
    ("a[href]", "href", LinkOrigin::Anchor),
    ("area[href]", "href", LinkOrigin::Anchor),
    ("link[href]", "href", LinkOrigin::LinkTag),
    ("iframe[src]", "src", LinkOrigin::Embedded),
    ("frame[src]", "src", LinkOrigin::Embedded),
    ("embed[src]", "src", LinkOrigin::Embedded),
    ("object[data]", "data", LinkOrigin::Embedded),
    ("form[action]", "action", LinkOrigin::Form),
    ("[data-href]", "data-href", LinkOrigin::DataAttribute),
    ("[data-url]", "data-url", LinkOrigin::DataAttribute),
    ("[data-src]", "data-src", LinkOrigin::DataAttribute),
    ("[data-file]", "data-file", LinkOrigin::DataAttribute),
    ("[data-download]", "data-download", LinkOrigin::DataAttribute),
];

/// `<link rel>` values that never point at content
const IGNORED_LINK_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "shortcut icon",
    "apple-touch-icon",
    "preconnect",
    "dns-prefetch",
    "preload",
    "modulepreload",
    "manifest",
];

/// Compiles a constant pattern once; a pattern that fails to compile is skipped
fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    name: &str,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!("Invalid {} pattern: {}", name, e);
            None
        }
    })
    .as_ref()
}

fn script_assignment_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(
        &RE,
        "script assignment",
        r#"(?:href|src|action|location(?:\.href)?|location\s*\.\s*(?:assign|replace)\s*\()\s*=?\s*["']([^"'\s]+)["']"#,
    )
}

fn script_open_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, "window.open", r#"window\.open\s*\(\s*["']([^"'\s]+)["']"#)
}

fn script_document_literal_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(
        &RE,
        "document literal",
        r#"["']((?:https?://|/|\.\.?/)?[^"'\s<>]+\.(?:pdf|docx?|pptx?|xlsx?|odt|ods|odp|rtf|txt|csv|epub)(?:\?[^"'\s<>]*)?)["']"#,
    )
}

/// Quoted absolute http(s) URL literals such as route tables and config objects
fn script_absolute_literal_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, "absolute URL literal", r#"["'](https?://[^"'\s<>\\]+)["']"#)
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a>` / `<area>` hrefs, including those with a `download` attribute
/// - `<link href>` except stylesheets, icons and resource hints
/// - iframe, frame and embed `src`, object `data`, form `action`
/// - data-href, data-url, data-src, data-file, data-download
/// - `<meta http-equiv="refresh" content="0; url=...">`
/// - URL literals assigned to `location`, `href`, `src`, passed to
///   `location.assign/replace` or `window.open`, ending in a document
///   extension, or quoted as absolute http(s) URLs, inside inline
///   `<script>` blocks and `on*` handlers
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
///
/// **Note:** `rel="nofollow"` links ARE followed
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the page was fetched from
///
/// # Example
///
/// ```
/// use doc_harvester::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base_url = extract_base(&document, page_url);

    let mut collector = LinkCollector::default();
    collect_attribute_links(&document, &base_url, &mut collector);
    collect_meta_refresh(&document, &base_url, &mut collector);
    collect_script_links(&document, &base_url, &mut collector);

    ParsedPage {
        title: extract_title(&document),
        links: collector.links,
    }
}

/// Deduplicates links by URL while merging what each occurrence knows
#[derive(Default)]
struct LinkCollector {
    links: Vec<LinkRef>,
    positions: HashMap<String, usize>,
}

impl LinkCollector {
    fn push(&mut self, link: LinkRef) {
        match self.positions.get(link.url.as_str()) {
            Some(&idx) => {
                let existing = &mut self.links[idx];
                existing.download_attr |= link.download_attr;
                if existing.text.is_empty() && !link.text.is_empty() {
                    existing.text = link.text;
                }
            }
            None => {
                self.positions
                    .insert(link.url.as_str().to_string(), self.links.len());
                self.links.push(link);
            }
        }
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_base(document: &Html, page_url: &Url) -> Url {
    let Ok(selector) = Selector::parse("base[href]") else {
        return page_url.clone();
    };
    document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or_else(|| page_url.clone())
}

fn collect_attribute_links(document: &Html, base_url: &Url, collector: &mut LinkCollector) {
    for (selector, attr, origin) in ATTRIBUTE_SOURCES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if *origin == LinkOrigin::LinkTag && is_ignored_link_tag(&element) {
                continue;
            }
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            if let Some(url) = resolve_link(value, base_url) {
                collector.push(LinkRef {
                    url,
                    text: link_text(&element),
                    origin: *origin,
                    download_attr: element.value().attr("download").is_some(),
                });
            }
        }
    }
}

fn is_ignored_link_tag(element: &ElementRef) -> bool {
    element
        .value()
        .attr("rel")
        .map(|rel| {
            let rel = rel.to_ascii_lowercase();
            IGNORED_LINK_RELS.iter().any(|ignored| rel.trim() == *ignored)
        })
        .unwrap_or(false)
}

fn collect_meta_refresh(document: &Html, base_url: &Url, collector: &mut LinkCollector) {
    let Ok(selector) = Selector::parse("meta[http-equiv][content]") else {
        return;
    };
    for element in document.select(&selector) {
        let is_refresh = element
            .value()
            .attr("http-equiv")
            .map(|v| v.eq_ignore_ascii_case("refresh"))
            .unwrap_or(false);
        if !is_refresh {
            continue;
        }
        let content = element.value().attr("content").unwrap_or("");
        if let Some(target) = refresh_target(content) {
            if let Some(url) = resolve_link(target, base_url) {
                collector.push(LinkRef {
                    url,
                    text: String::new(),
                    origin: LinkOrigin::MetaRefresh,
                    download_attr: false,
                });
            }
        }
    }
}

/// Extracts the URL from a refresh directive such as `5; URL='/next'`
fn refresh_target(content: &str) -> Option<&str> {
    let lower = content.to_ascii_lowercase();
    let idx = lower.find("url=")?;
    let target = content[idx + 4..].trim().trim_matches(|c| c == '\'' || c == '"');
    (!target.is_empty()).then_some(target)
}

fn collect_script_links(document: &Html, base_url: &Url, collector: &mut LinkCollector) {
    let mut sources: Vec<String> = Vec::new();

    if let Ok(selector) = Selector::parse("script:not([src])") {
        sources.extend(
            document
                .select(&selector)
                .map(|e| e.text().collect::<String>()),
        );
    }

    // Inline event handlers such as onclick="location.href='/x.pdf'"
    if let Ok(selector) = Selector::parse("[onclick]") {
        sources.extend(
            document
                .select(&selector)
                .filter_map(|e| e.value().attr("onclick").map(str::to_string)),
        );
    }

    for source in &sources {
        let patterns = [
            script_assignment_re(),
            script_open_re(),
            script_document_literal_re(),
            script_absolute_literal_re(),
        ];
        for re in patterns.into_iter().flatten() {
            for captures in re.captures_iter(source) {
                let Some(raw) = captures.get(1) else {
                    continue;
                };
                if let Some(url) = resolve_link(raw.as_str(), base_url) {
                    collector.push(LinkRef {
                        url,
                        text: String::new(),
                        origin: LinkOrigin::Script,
                        download_attr: false,
                    });
                }
            }
        }
    }
}

/// Visible text of a link, falling back to title and aria-label
fn link_text(element: &ElementRef) -> String {
    let text = collapse_whitespace(&element.text().collect::<String>());
    if !text.is_empty() {
        return text;
    }
    ["title", "aria-label", "alt"]
        .iter()
        .find_map(|attr| element.value().attr(attr))
        .map(collapse_whitespace)
        .unwrap_or_default()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    // Skip empty hrefs
    if href.is_empty() {
        return None;
    }

    // Skip special schemes
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    // Skip fragment-only links (same page anchors)
    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn urls(parsed: &ParsedPage) -> Vec<String> {
        parsed.links.iter().map(|l| l.url.to_string()).collect()
    }

    #[test]
    fn test_extract_title_with_whitespace() {
        let html = r#"<html><head><title>  Test
            Page  </title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let parsed = parse_html("<html><head></head><body></body></html>", &base_url());
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_extract_relative_link() {
        let html = r#"<html><body><a href="other">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://example.com/other"]);
        assert_eq!(parsed.links[0].text, "Link");
        assert_eq!(parsed.links[0].origin, LinkOrigin::Anchor);
    }

    #[test]
    fn test_base_href_respected() {
        let html = r#"<html><head><base href="https://cdn.example.com/files/"></head>
            <body><a href="report.pdf">Report</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://cdn.example.com/files/report.pdf"]);
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">a</a>
            <a href="mailto:test@example.com">b</a>
            <a href="tel:+1234567890">c</a>
            <a href="data:text/html,<h1>x</h1>">d</a>
            <a href="#section">e</a>
            <a href="/valid">f</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://example.com/valid"]);
    }

    #[test]
    fn test_download_attribute_kept_and_flagged() {
        let html = r#"<html><body><a href="/file" download>Get it</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links.len(), 1);
        assert!(parsed.links[0].download_attr);
    }

    #[test]
    fn test_follow_nofollow_links() {
        let html = r#"<html><body><a href="/page2" rel="nofollow">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://example.com/page2"]);
    }

    #[test]
    fn test_embedded_form_and_data_attributes() {
        let html = r#"<html><body>
            <iframe src="/viewer"></iframe>
            <embed src="/slides.pptx">
            <object data="/doc.pdf"></object>
            <form action="/search"></form>
            <button data-href="/files/a.docx">Download</button>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        let found = urls(&parsed);
        for expected in [
            "https://example.com/viewer",
            "https://example.com/slides.pptx",
            "https://example.com/doc.pdf",
            "https://example.com/search",
            "https://example.com/files/a.docx",
        ] {
            assert!(found.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_stylesheets_ignored_canonical_kept() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="icon" href="/favicon.ico">
            <link rel="canonical" href="https://example.com/canonical">
        </head></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://example.com/canonical"]);
    }

    #[test]
    fn test_meta_refresh() {
        let html = r#"<html><head><meta http-equiv="Refresh" content="0; URL='/moved'"></head></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://example.com/moved"]);
        assert_eq!(parsed.links[0].origin, LinkOrigin::MetaRefresh);
    }

    #[test]
    fn test_script_links() {
        let html = r#"<html><body>
            <script>
                function go() { window.location.href = "/next-page"; }
                var files = ["/uploads/syllabus.pdf"];
                window.open('https://files.example.org/x.xlsx');
            </script>
            <span onclick="location.assign('/clicked')">x</span>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        let found = urls(&parsed);
        assert!(found.contains(&"https://example.com/next-page".to_string()));
        assert!(found.contains(&"https://example.com/uploads/syllabus.pdf".to_string()));
        assert!(found.contains(&"https://files.example.org/x.xlsx".to_string()));
        assert!(found.contains(&"https://example.com/clicked".to_string()));
        assert!(parsed.links.iter().all(|l| l.origin == LinkOrigin::Script));
    }

    #[test]
    fn test_script_absolute_url_literals() {
        let html = r#"<html><body>
            <script>var routes = {"next": "https://example.com/archive/2023"};</script>
            <script>const API = 'http://data.example.org/v1/list?page=2';</script>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            urls(&parsed),
            vec![
                "https://example.com/archive/2023",
                "http://data.example.org/v1/list?page=2"
            ]
        );
        assert!(parsed.links.iter().all(|l| l.origin == LinkOrigin::Script));
    }

    #[test]
    fn test_script_patterns_compile() {
        assert!(script_assignment_re().is_some());
        assert!(script_open_re().is_some());
        assert!(script_document_literal_re().is_some());
        assert!(script_absolute_literal_re().is_some());
    }

    #[test]
    fn test_duplicate_links_merged() {
        let html = r#"<html><body>
            <a href="/a.pdf"><img src="i.png"></a>
            <a href="/a.pdf">Annual report</a>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0].text, "Annual report");
    }

    #[test]
    fn test_refresh_target() {
        assert_eq!(refresh_target("5;url=/x"), Some("/x"));
        assert_eq!(refresh_target("0; URL=\"https://e.com/\""), Some("https://e.com/"));
        assert_eq!(refresh_target("30"), None);
    }
}
