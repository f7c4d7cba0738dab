//! Configuration module for Doc-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so a configuration file is optional.
//!
//! # Example
//!
//! ```no_run
//! use doc_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, BrowserFlavor, ClassifierConfig, Config, CrawlerConfig, DownloadConfig,
    FetchConfig, FilterConfig, OutputConfig, RetryConfig, UserAgentConfig, WebDriverEndpoint,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_depth: Option<u32>,
    pub delay_secs: Option<f64>,
    pub max_pages: Option<u64>,
}

impl Config {
    /// Applies command-line overrides and re-validates the result
    pub fn with_overrides(mut self, overrides: &Overrides) -> crate::ConfigResult<Self> {
        if let Some(depth) = overrides.max_depth {
            self.crawler.max_depth = depth;
        }
        if let Some(delay) = overrides.delay_secs {
            self.crawler.delay_secs = delay;
        }
        if let Some(max_pages) = overrides.max_pages {
            self.crawler.max_pages = Some(max_pages);
        }
        validate(&self)?;
        Ok(self)
    }
}
