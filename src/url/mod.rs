//! URL handling module for Doc-Harvester
//!
//! This module provides URL normalization, domain extraction, wildcard matching,
//! and the domain filter applied to every discovered link.

mod domain;
mod normalize;

use crate::config::FilterConfig;

pub use domain::{extract_domain, matches_wildcard, storage_domain};
pub use normalize::{normalize_parsed, normalize_url};

/// What the crawl may do with a link on a given domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainScope {
    /// Pages may be followed and documents downloaded
    Follow,
    /// Documents may be downloaded, pages are not followed
    DocumentsOnly,
    /// The domain is never contacted
    Excluded,
}

impl DomainScope {
    pub fn may_follow(&self) -> bool {
        matches!(self, Self::Follow)
    }

    pub fn may_download(&self) -> bool {
        !matches!(self, Self::Excluded)
    }
}

/// Classifies a domain against the configured filters
///
/// The checks run in priority order:
/// 1. Exclude list (highest priority)
/// 2. Allow list, when non-empty; domains outside it keep document capture only
/// 3. Follow (default)
///
/// # Arguments
///
/// * `domain` - The domain string to classify (should be lowercase)
/// * `filters` - The filter configuration
///
/// # Examples
///
/// ```
/// use doc_harvester::config::FilterConfig;
/// use doc_harvester::url::{domain_scope, DomainScope};
///
/// let filters = FilterConfig {
///     exclude_domains: vec!["*.ads.example.com".to_string()],
///     allowed_domains: vec!["example.com".to_string()],
///     ..FilterConfig::default()
/// };
///
/// assert_eq!(domain_scope("example.com", &filters), DomainScope::Follow);
/// assert_eq!(domain_scope("cdn.other.org", &filters), DomainScope::DocumentsOnly);
/// assert_eq!(domain_scope("x.ads.example.com", &filters), DomainScope::Excluded);
/// ```
pub fn domain_scope(domain: &str, filters: &FilterConfig) -> DomainScope {
    if filters
        .exclude_domains
        .iter()
        .any(|pattern| matches_wildcard(pattern, domain))
    {
        return DomainScope::Excluded;
    }

    if !filters.allowed_domains.is_empty()
        && !filters
            .allowed_domains
            .iter()
            .any(|pattern| matches_wildcard(pattern, domain))
    {
        return DomainScope::DocumentsOnly;
    }

    DomainScope::Follow
}
