//! Crawl-level errors and the policy applied to each kind.
//!
//! Every failure that reaches the crawl loop is a [`CrawlError`], and
//! [`CrawlError::policy`] maps it to exactly one [`ErrorPolicy`]. The loop
//! never decides by inspecting messages.

use film_walk_database::DbError;
use film_walk_scraper::ScrapeError;
use strum_macros::{AsRefStr, Display};

/// How the crawl loop reacts to a failure.
///
/// Malformed diary rows are not listed: the diary parser skips them in
/// place and counts them in `UserDiary::skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorPolicy {
    /// Back off, then run the next step.
    Retry,
    /// Abandon the current handle and move on.
    SkipUser,
    /// Stop the crawl.
    Fatal,
}

/// Errors surfaced by a crawl step.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// A page request failed.
    #[error("Network error: {0}")]
    Network(#[source] ScrapeError),

    /// The random walk did not produce a handle.
    #[error("Discovery failed: {0}")]
    Discovery(#[source] ScrapeError),

    /// A page or profile link could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(#[source] ScrapeError),

    /// A store read or commit failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),

    /// The crawler configuration is invalid or unreadable.
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },
}

impl From<ScrapeError> for CrawlError {
    fn from(e: ScrapeError) -> Self {
        match e {
            ScrapeError::Http(_) | ScrapeError::Status { .. } => Self::Network(e),
            ScrapeError::DiscoveryExhausted { .. } => Self::Discovery(e),
            ScrapeError::Parse(_) | ScrapeError::InvalidHandle(_) => Self::Parse(e),
        }
    }
}

impl CrawlError {
    /// Builds a [`CrawlError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The loop's reaction to this error.
    ///
    /// | Kind | Policy |
    /// |---|---|
    /// | `Network` with 429, 5xx, timeout or connect failure | `Retry` |
    /// | `Network` with any other status | `SkipUser` |
    /// | `Discovery` | `Retry` |
    /// | `Parse` | `SkipUser` |
    /// | `Persistence` | `SkipUser` |
    /// | `Config` | `Fatal` |
    #[must_use]
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            Self::Network(e) if e.is_transient() => ErrorPolicy::Retry,
            Self::Discovery(_) => ErrorPolicy::Retry,
            Self::Network(_) | Self::Parse(_) | Self::Persistence(_) => ErrorPolicy::SkipUser,
            Self::Config { .. } => ErrorPolicy::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ScrapeError {
        ScrapeError::Status {
            url: "https://letterboxd.com/alice/films/diary/page/1".to_owned(),
            status,
        }
    }

    #[test]
    fn network_errors_split_on_transience() {
        assert_eq!(CrawlError::from(status(503)).policy(), ErrorPolicy::Retry);
        assert_eq!(CrawlError::from(status(429)).policy(), ErrorPolicy::Retry);
        assert_eq!(CrawlError::from(status(404)).policy(), ErrorPolicy::SkipUser);
    }

    #[test]
    fn scrape_errors_map_to_kinds() {
        let exhausted = CrawlError::from(ScrapeError::DiscoveryExhausted { attempts: 3 });
        assert!(matches!(exhausted, CrawlError::Discovery(_)));
        assert_eq!(exhausted.policy(), ErrorPolicy::Retry);

        let handle = CrawlError::from(ScrapeError::InvalidHandle("/".to_owned()));
        assert!(matches!(handle, CrawlError::Parse(_)));
        assert_eq!(handle.policy(), ErrorPolicy::SkipUser);
    }

    #[test]
    fn config_is_fatal() {
        assert_eq!(CrawlError::config("bad").policy(), ErrorPolicy::Fatal);
        assert_eq!(ErrorPolicy::Fatal.to_string(), "fatal");
    }
}
