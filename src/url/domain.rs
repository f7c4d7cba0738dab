use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use doc_harvester::url::extract_domain;
///
/// let url = Url::parse("https://Docs.Example.COM:8443/guide.pdf").unwrap();
/// assert_eq!(extract_domain(&url), Some("docs.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Directory-safe domain name used to partition downloaded documents
///
/// The `www.` prefix is dropped so that `www.example.com` and `example.com`
/// share one folder; any character outside `[a-z0-9.-]` becomes `_`.
pub fn storage_domain(url: &Url) -> String {
    let host = extract_domain(url).unwrap_or_else(|| "unknown-host".to_string());
    let host = host.strip_prefix("www.").unwrap_or(&host);
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Checks if a domain matches a wildcard pattern
///
/// `"example.com"` matches only itself; `"*.example.com"` matches the bare
/// domain and every subdomain beneath it. Both arguments are expected in
/// lowercase.
///
/// ```
/// use doc_harvester::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "a.b.example.com"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ignores_port_and_case() {
        let url = Url::parse("http://EXAMPLE.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_ip_host() {
        let url = Url::parse("http://127.0.0.1:4000/docs").unwrap();
        assert_eq!(extract_domain(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_storage_domain_strips_www() {
        let url = Url::parse("https://www.example.com/a.pdf").unwrap();
        assert_eq!(storage_domain(&url), "example.com");
    }

    #[test]
    fn test_storage_domain_ipv6_is_sanitized() {
        let url = Url::parse("http://[::1]:9000/a.pdf").unwrap();
        let dir = storage_domain(&url);
        assert!(!dir.contains(':'));
        assert!(!dir.contains('['));
    }

    #[test]
    fn test_exact_pattern() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
    }

    #[test]
    fn test_wildcard_pattern() {
        assert!(matches_wildcard("*.co.uk", "co.uk"));
        assert!(matches_wildcard("*.co.uk", "shop.example.co.uk"));
        assert!(!matches_wildcard("*.co.uk", "myco.uk"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
    }

    #[test]
    fn test_empty_candidate() {
        assert!(!matches_wildcard("*.example.com", ""));
        assert!(!matches_wildcard("example.com", ""));
    }
}
