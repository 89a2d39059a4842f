#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Core types for the film walk crawler.
//!
//! A crawl discovers a [`UserHandle`], scrapes that user's diary into a
//! [`UserDiary`] of [`DiaryEntry`] rows, and summarises the result as
//! [`UserStats`] at ingestion time. Every processed handle produces a
//! [`CrawlOutcome`] that feeds the throughput statistics.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A half-star rating code, from 1 (½ star) to 10 (5 stars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Lowest valid rating code (½ star).
    pub const MIN: u8 = 1;
    /// Highest valid rating code (5 stars).
    pub const MAX: u8 = 10;

    /// Creates a rating from its numeric code.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-10.
    pub const fn from_value(value: u8) -> Result<Self, InvalidRatingError> {
        if value >= Self::MIN && value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(InvalidRatingError { value })
        }
    }

    /// Returns the numeric rating code.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns the rating expressed in stars (0.5 to 5.0).
    #[must_use]
    pub fn stars(self) -> f32 {
        f32::from(self.0) / 2.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = InvalidRatingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// Error returned when attempting to create a [`Rating`] from a value
/// outside 1-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRatingError {
    /// The invalid rating value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidRatingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid rating code {}: expected 1-10", self.value)
    }
}

impl std::error::Error for InvalidRatingError {}

/// Canonical relative path of a film, e.g. `/film/foo/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieRef(String);

impl MovieRef {
    /// Wraps an already-canonical film path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Builds a film path from a diary link, which the site prefixes with
    /// the diary owner's username (`/alice/film/foo/` becomes `/film/foo/`).
    ///
    /// Links that do not start with the username are kept as-is.
    #[must_use]
    pub fn from_diary_href(href: &str, username: &str) -> Self {
        let prefix = format!("/{username}");
        match href.strip_prefix(&prefix) {
            Some(rest) if rest.starts_with('/') => Self(rest.to_owned()),
            _ => Self(href.to_owned()),
        }
    }

    /// Returns the film path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MovieRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A crawled user: the username plus its fully-qualified profile URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserHandle {
    username: String,
    profile_url: String,
}

impl UserHandle {
    /// Parses a profile link (`/alice/` or `https://site/alice/`) relative to
    /// `base_url`.
    ///
    /// Returns `None` if the link has no username segment.
    #[must_use]
    pub fn parse(base_url: &str, href: &str) -> Option<Self> {
        let base = base_url.trim_end_matches('/');
        let path = href.strip_prefix(base).unwrap_or(href);
        let username = path.split('/').find(|segment| !segment.is_empty())?;

        if username.contains(':') || username.contains('?') {
            return None;
        }

        Some(Self {
            username: username.to_owned(),
            profile_url: format!("{base}/{username}/"),
        })
    }

    /// Returns the username, the store's unique key for users.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the profile URL, always ending in `/`.
    #[must_use]
    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }
}

impl std::fmt::Display for UserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.username)
    }
}

/// One row of a user's viewing log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiaryEntry {
    /// The film that was watched.
    pub movie: MovieRef,
    /// The watched date.
    pub date: NaiveDate,
    /// The rating given, if any.
    pub rating: Option<Rating>,
}

/// The ordered result of scraping one user's diary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDiary {
    /// Whose diary this is.
    pub handle: UserHandle,
    /// Entries in the site's native (reverse-chronological) order.
    pub entries: Vec<DiaryEntry>,
    /// Rows dropped as data anomalies (ambiguous rating, bad date, ...).
    pub skipped: u32,
    /// Number of diary pages fetched, including the terminal page.
    pub pages_fetched: u32,
}

impl UserDiary {
    /// Creates an empty diary for `handle`.
    #[must_use]
    pub const fn new(handle: UserHandle) -> Self {
        Self {
            handle,
            entries: Vec::new(),
            skipped: 0,
            pages_fetched: 0,
        }
    }

    /// Number of entries that carry a rating.
    #[must_use]
    pub fn rated_count(&self) -> usize {
        self.entries.iter().filter(|e| e.rating.is_some()).count()
    }

    /// Summarises this diary as a [`UserStats`] snapshot taken at `timestamp`.
    #[must_use]
    pub fn stats(&self, timestamp: NaiveDateTime) -> UserStats {
        UserStats {
            username: self.handle.username().to_owned(),
            num_diaries: self.entries.len() as u64,
            num_diaries_rated: self.rated_count() as u64,
            timestamp,
        }
    }
}

/// Per-user snapshot written once at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    /// Unique username.
    pub username: String,
    /// Number of diary entries ingested.
    pub num_diaries: u64,
    /// Number of those entries with a rating.
    pub num_diaries_rated: u64,
    /// When the user was ingested.
    pub timestamp: NaiveDateTime,
}

/// Result of processing one discovered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CrawlOutcome {
    /// The user is already in the store; nothing was fetched.
    AlreadyKnown,
    /// The user was scraped and staged for persistence.
    NewlyScraped {
        /// Number of diary entries ingested for this user.
        entries: u64,
    },
    /// The step failed (network, parse or persistence error).
    Failed,
}
