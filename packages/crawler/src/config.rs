//! Crawler configuration.
//!
//! Every field has a default, so an empty (or absent) TOML file is a valid
//! configuration. CLI flags are applied on top of whatever was loaded.
//!
//! ```toml
//! base_url = "https://letterboxd.com"
//! commit_every = 100
//! report_every = 10
//! eta_targets = [10_000_000, 100_000_000, 1_000_000_000]
//!
//! [retry]
//! max_retries = 5
//! base_delay_ms = 2000
//! max_delay_ms = 60000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use film_walk_database::store::DEFAULT_COMMIT_EVERY;
use film_walk_scraper::discover::DEFAULT_MAX_MEMBER_PAGE;
use film_walk_scraper::retry::RetryPolicy;
use film_walk_scraper::site::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};

use crate::CrawlError;
use crate::stats::{DEFAULT_ETA_TARGETS, DEFAULT_REPORT_EVERY};

/// User agent sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("film_walk/", env!("CARGO_PKG_VERSION"));

/// Settings for one crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Site root every URL is built from.
    pub base_url: String,
    /// Store location. `None` uses the default under `data/`.
    pub db_path: Option<PathBuf>,
    /// Highest member-listing page the discoverer samples.
    pub max_member_page: u32,
    /// Film/page samples per discovery before giving up. `None` never
    /// gives up.
    pub discovery_max_attempts: Option<u32>,
    /// Diary pages fetched per user at most. `None` is unbounded.
    pub max_pages_per_user: Option<u32>,
    /// Processed handles between store commits.
    pub commit_every: u64,
    /// Processed handles between statistics reports.
    pub report_every: u64,
    /// Diary totals to project finish times for.
    pub eta_targets: Vec<u64>,
    /// Backoff for page requests and for failing crawl steps.
    pub retry: RetryPolicy,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Year assumed for month labels that omit one. `None` uses the
    /// current year.
    pub fallback_year: Option<i32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            db_path: None,
            max_member_page: DEFAULT_MAX_MEMBER_PAGE,
            discovery_max_attempts: None,
            max_pages_per_user: None,
            commit_every: DEFAULT_COMMIT_EVERY,
            report_every: DEFAULT_REPORT_EVERY,
            eta_targets: DEFAULT_ETA_TARGETS.to_vec(),
            retry: RetryPolicy::default(),
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            fallback_year: None,
        }
    }
}

impl CrawlerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Config`] if the TOML is malformed or the
    /// resulting configuration is invalid.
    pub fn from_toml_str(contents: &str) -> Result<Self, CrawlError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| CrawlError::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Config`] if the file cannot be read or parsed,
    /// or the configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, CrawlError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CrawlError::config(format!("cannot read {}: {e}", path.display())))?;
        log::debug!("Loaded crawler config from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(CrawlError::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.max_member_page == 0 {
            return Err(CrawlError::config("max_member_page must be at least 1"));
        }
        if self.commit_every == 0 {
            return Err(CrawlError::config("commit_every must be at least 1"));
        }
        if self.report_every == 0 {
            return Err(CrawlError::config("report_every must be at least 1"));
        }
        if self.discovery_max_attempts == Some(0) {
            return Err(CrawlError::config("discovery_max_attempts must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(CrawlError::config("request_timeout_secs must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(CrawlError::config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }

    /// The per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(CrawlerConfig::from_toml_str("").unwrap(), CrawlerConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = CrawlerConfig::from_toml_str(
            r"
            commit_every = 25
            eta_targets = [1000]

            [retry]
            max_retries = 2
            ",
        )
        .unwrap();

        assert_eq!(config.commit_every, 25);
        assert_eq!(config.eta_targets, vec![1000]);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
        assert_eq!(config.report_every, DEFAULT_REPORT_EVERY);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for toml in [
            "commit_every = 0",
            "report_every = 0",
            "base_url = \"ftp://example.com\"",
            "discovery_max_attempts = 0",
            "commit_every = \"often\"",
        ] {
            let err = CrawlerConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, CrawlError::Config { .. }), "{toml}: {err}");
        }
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = CrawlerConfig::load(Path::new("/nonexistent/film_walk.toml")).unwrap_err();
        assert!(matches!(err, CrawlError::Config { .. }));
    }
}
