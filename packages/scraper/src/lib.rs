#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Page fetching, random-walk discovery and diary scraping.
//!
//! Provides the [`PageFetcher`] trait with a `reqwest`-backed
//! implementation ([`fetch::HttpFetcher`]) and an in-memory one
//! ([`fetch::StaticFetcher`]), plus the three scraping stages of a crawl
//! step: [`discover`] (film → member → handle), [`diary`] (paginated diary
//! table parsing) and [`rating`] (rating code normalization).
//!
//! This crate has no awareness of the store. It turns markup into
//! [`film_walk_diary_models`] values that callers persist however they like.

pub mod diary;
pub mod discover;
pub mod fetch;
pub mod rating;
pub mod retry;
pub mod site;

/// Errors that can occur while fetching or scraping pages.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// An HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// The requested URL.
        url: String,
        /// The response status code.
        status: u16,
    },

    /// A selector, pattern or page structure could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A profile link did not contain a username.
    #[error("Invalid user handle: {0}")]
    InvalidHandle(String),

    /// Discovery gave up after its configured number of attempts.
    #[error("No member listing found after {attempts} discovery attempts")]
    DiscoveryExhausted {
        /// How many film/page samples were tried.
        attempts: u32,
    },
}

impl ScrapeError {
    /// Returns `true` if retrying the same request could succeed
    /// (timeouts, connection failures, rate limiting, server errors).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::DiscoveryExhausted { .. } => true,
            Self::Parse(_) | Self::InvalidHandle(_) => false,
        }
    }
}

/// Source of raw page markup.
///
/// Implementations own the transport (and any retry policy); callers only
/// see the final body or the final error.
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the page cannot be fetched.
    fn fetch(&self, url: &str) -> impl std::future::Future<Output = Result<String, ScrapeError>> + Send;
}

/// Parses a CSS selector string, returning a [`ScrapeError`] on failure.
pub(crate) fn parse_selector(selector: &str) -> Result<scraper::Selector, ScrapeError> {
    scraper::Selector::parse(selector)
        .map_err(|e| ScrapeError::Parse(format!("invalid CSS selector '{selector}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_classified() {
        let status = |status| ScrapeError::Status {
            url: "https://letterboxd.com/".to_owned(),
            status,
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(404).is_transient());
        assert!(!ScrapeError::Parse("bad".to_owned()).is_transient());
    }
}
