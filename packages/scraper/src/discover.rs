//! Random-walk user discovery.
//!
//! There is no global user index to sample from, so a user is reached by
//! sampling a film linked from the landing page, then a random page of
//! that film's member listing, then a random member on that page. Members
//! of popular films are over-represented; that bias is accepted.
//!
//! A sampled page past the end of a listing is empty (or missing), in which
//! case the walk starts over from the landing page. Transient fetch errors
//! are returned so the caller can back off. By default it retries forever;
//! [`Discoverer::with_max_attempts`] bounds it.

use std::sync::LazyLock;

use film_walk_diary_models::{MovieRef, UserHandle};
use rand::Rng;
use rand::seq::IndexedRandom as _;
use regex::Regex;
use scraper::{Html, Selector};

use crate::site::SiteUrls;
use crate::{PageFetcher, ScrapeError, parse_selector};

/// Highest member-listing page sampled by default.
pub const DEFAULT_MAX_MEMBER_PAGE: u32 = 250;

static FILM_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/film/[^/]+/").unwrap_or_else(|_| unreachable!()));

/// Samples user handles by random walk.
#[derive(Debug)]
pub struct Discoverer<R> {
    site: SiteUrls,
    rng: R,
    max_member_page: u32,
    max_attempts: Option<u32>,
    member_selector: Selector,
}

impl<R: Rng> Discoverer<R> {
    /// Creates a discoverer for `site` drawing from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Parse`] if a built-in selector fails to parse.
    pub fn new(site: SiteUrls, rng: R) -> Result<Self, ScrapeError> {
        Ok(Self {
            site,
            rng,
            max_member_page: DEFAULT_MAX_MEMBER_PAGE,
            max_attempts: None,
            member_selector: parse_selector("td.table-person h3 a[href]")?,
        })
    }

    /// Sets the highest member-listing page to sample (at least 1).
    #[must_use]
    pub fn with_max_member_page(mut self, max_member_page: u32) -> Self {
        self.max_member_page = max_member_page.max(1);
        self
    }

    /// Bounds the number of film/page samples per [`Self::discover`] call.
    /// `None` retries forever.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Walks from the landing page to a random member's profile.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the landing page cannot be fetched or a
    /// listing fetch fails transiently, or
    /// [`ScrapeError::DiscoveryExhausted`] once the attempt bound is hit.
    pub async fn discover<F: PageFetcher>(&mut self, fetcher: &F) -> Result<UserHandle, ScrapeError> {
        let mut attempts: u32 = 0;

        loop {
            if let Some(max) = self.max_attempts
                && attempts >= max
            {
                return Err(ScrapeError::DiscoveryExhausted { attempts });
            }
            attempts += 1;

            let landing = fetcher.fetch(&self.site.landing()).await?;
            let films = extract_film_paths(&landing);
            let Some(film) = films.choose(&mut self.rng).cloned() else {
                log::warn!("Landing page has no film links, retrying");
                continue;
            };

            let page = self.rng.random_range(1..=self.max_member_page);
            let listing_url = self.site.members_page(&film, page);
            let listing = match fetcher.fetch(&listing_url).await {
                Ok(listing) => listing,
                Err(e) if !e.is_transient() => {
                    log::debug!("Unusable member listing at {listing_url} ({e}), retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let members = self.extract_member_links(&listing);

            let Some(href) = members.choose(&mut self.rng) else {
                log::debug!("Empty member listing at {listing_url}, retrying");
                continue;
            };

            let handle = UserHandle::parse(self.site.base_url(), href)
                .ok_or_else(|| ScrapeError::InvalidHandle(href.clone()))?;
            log::debug!("Discovered {handle} via {film} page {page} after {attempts} attempt(s)");
            return Ok(handle);
        }
    }

    fn extract_member_links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.member_selector)
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_owned)
            .collect()
    }
}

/// Extracts every `/film/<slug>/` path present in `html`, in order of
/// appearance (duplicates kept, so frequently linked films weigh more).
#[must_use]
pub fn extract_film_paths(html: &str) -> Vec<MovieRef> {
    FILM_PATH
        .find_iter(html)
        .map(|m| MovieRef::new(m.as_str()))
        .collect()
}
