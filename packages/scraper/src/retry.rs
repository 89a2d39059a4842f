//! HTTP retry helpers for transient errors.
//!
//! Every page request goes through [`send_text`], which retries transient
//! failures (timeouts, connection resets, HTTP 429, HTTP 5xx) with capped
//! exponential backoff. The same [`RetryPolicy`] also paces the crawl loop
//! when a whole step fails with a network error.
//!
//! ```ignore
//! let html = retry::send_text(|| client.get(&url), &policy).await?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ScrapeError;

/// Capped exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each following retry.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    /// 5 retries at 2s, 4s, 8s, 16s, 32s (62s total), capped at 60s.
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits, for tests and offline fetchers.
    #[must_use]
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// Does **not** retry HTTP 4xx (except 429), which are permanent.
///
/// # Errors
///
/// Returns [`ScrapeError`] if the request still fails after
/// `policy.max_retries` retries, or fails with a permanent error.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F, policy: &RetryPolicy) -> Result<String, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{} in {delay:?}...", policy.max_retries);
            tokio::time::sleep(delay).await;
        }

        match send_once(&build_request).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                log::warn!("  transient error: {e}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[allow(clippy::future_not_send)]
async fn send_once<F>(build_request: &F) -> Result<String, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = build_request().send().await?;
    let status = response.status();

    if !status.is_success() {
        return Err(ScrapeError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.text().await?)
}
