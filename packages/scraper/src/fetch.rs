//! [`PageFetcher`] implementations.
//!
//! [`HttpFetcher`] is the live transport: a shared `reqwest` client whose
//! requests go through [`crate::retry::send_text`]. [`StaticFetcher`]
//! serves pages (or canned HTTP failures) from memory and records every
//! requested URL, which makes it suitable for replaying saved pages and for
//! tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::retry::{self, RetryPolicy};
use crate::{PageFetcher, ScrapeError};

/// Fetches pages over HTTP with retry.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// Builds a fetcher with the given user agent, per-request timeout and
    /// retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the HTTP client cannot be built.
    pub fn new(user_agent: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, retry })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        log::debug!("GET {url}");
        retry::send_text(|| self.client.get(url), &self.retry).await
    }
}

/// Serves pages from an in-memory map of URL to markup or status code.
///
/// Unknown URLs fail with HTTP 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: BTreeMap<String, Result<String, u16>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    /// Creates an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `body` as the response for `url`.
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert_page(url, body);
        self
    }

    /// Makes `url` fail with HTTP `status`.
    #[must_use]
    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.pages.insert(url.into(), Err(status));
        self
    }

    /// Registers `body` as the response for `url` on an existing fetcher.
    pub fn insert_page(&mut self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.insert(url.into(), Ok(body.into()));
    }

    /// Every URL requested so far, in request order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_owned());
        }

        match self.pages.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(ScrapeError::Status {
                url: url.to_owned(),
                status: *status,
            }),
            None => Err(ScrapeError::Status {
                url: url.to_owned(),
                status: 404,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_fetcher_serves_and_records() {
        let fetcher = StaticFetcher::new()
            .with_page("https://a/", "<html>a</html>")
            .with_status("https://down/", 503);

        assert_eq!(fetcher.fetch("https://a/").await.unwrap(), "<html>a</html>");
        let missing = fetcher.fetch("https://b/").await.unwrap_err();
        assert!(matches!(missing, ScrapeError::Status { status: 404, .. }));
        let down = fetcher.fetch("https://down/").await.unwrap_err();
        assert!(down.is_transient());

        assert_eq!(
            fetcher.requests(),
            vec!["https://a/", "https://b/", "https://down/"]
        );
    }
}
