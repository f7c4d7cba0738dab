use crate::config::types::{
    BrowserConfig, ClassifierConfig, Config, CrawlerConfig, FilterConfig, OutputConfig,
    RetryConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Deepest crawl the configuration accepts
const MAX_DEPTH_LIMIT: u32 = 20;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config("fetch.retry", &config.fetch.retry)?;
    validate_retry_config("download.retry", &config.download.retry)?;
    validate_browser_config(&config.browser)?;
    validate_classifier_config(&config.classifier)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_filters(&config.filters)?;

    if config.download.max_bytes == 0 {
        return Err(ConfigError::Validation(
            "download.max_bytes must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth > MAX_DEPTH_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max_depth must be <= {}, got {}",
            MAX_DEPTH_LIMIT, config.max_depth
        )));
    }

    if !config.delay_secs.is_finite() || config.delay_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay must be a finite, non-negative number of seconds, got {}",
            config.delay_secs
        )));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_interval must be >= 1, got {}",
            config.checkpoint_interval
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(section: &str, config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "{}.max_attempts must be >= 1, got {}",
            section, config.max_attempts
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "{}.base_delay_ms ({}) must not exceed max_delay_ms ({})",
            section, config.base_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    for (name, endpoint) in [("primary", &config.primary), ("fallback", &config.fallback)] {
        if let Some(endpoint) = endpoint {
            validate_http_url(&format!("browser.{}.url", name), &endpoint.url)?;
        }
    }
    Ok(())
}

fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    validate_http_url("classifier.base_url", &config.base_url)?;

    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "classifier.model cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "classifier.timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_filters(config: &FilterConfig) -> Result<(), ConfigError> {
    for pattern in config
        .exclude_domains
        .iter()
        .chain(config.allowed_domains.iter())
    {
        validate_domain_pattern(pattern)?;
    }

    if config.skip_patterns.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::Validation(
            "skip_patterns cannot contain empty strings".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)
    } else {
        validate_domain_string(pattern)
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebDriverEndpoint;

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("localhost").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example..com").is_err());
        assert!(validate_domain_pattern("exa mple.com").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut config = Config::default();
        config.crawler.max_depth = MAX_DEPTH_LIMIT + 1;
        assert!(validate(&config).is_err());

        config.crawler.max_depth = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_non_finite_delay_rejected() {
        let mut config = Config::default();
        config.crawler.delay_secs = f64::NAN;
        assert!(validate(&config).is_err());
        config.crawler.delay_secs = f64::INFINITY;
        assert!(validate(&config).is_err());
        config.crawler.delay_secs = 0.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = Config::default();
        config.download.retry.max_attempts = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.fetch.retry.base_delay_ms = 5000;
        config.fetch.retry.max_delay_ms = 1000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_browser_endpoint_must_be_http() {
        let mut config = Config::default();
        config.browser.primary = Some(WebDriverEndpoint {
            url: "ws://localhost:9222".to_string(),
            flavor: Default::default(),
        });
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_disabled_classifier_not_checked() {
        let mut config = Config::default();
        config.classifier.base_url = "not a url".to_string();
        assert!(validate(&config).is_ok());
        config.classifier.enabled = true;
        assert!(validate(&config).is_err());
    }
}
