#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The crawl loop.
//!
//! A [`Crawler`] repeats one sequential step: discover a handle by random
//! walk, skip it if the store already has it, otherwise scrape its whole
//! diary and stage it. After every step (successful or not) the outcome is
//! recorded in [`stats::CrawlStats`], the store commits when its cadence is
//! due, and a statistics report is logged every `report_every` handles.
//!
//! Failures are classified by [`error::CrawlError::policy`]: transient ones
//! back off with the configured [`RetryPolicy`], user-level ones skip the
//! handle, and only configuration errors stop the crawl. Malformed diary
//! rows never get this far: the diary parser drops them itself. Users a
//! commit fails to persist are taken back out of the statistics.

pub mod config;
pub mod error;
pub mod progress;
pub mod stats;

use std::sync::Arc;

use chrono::{Datelike, Local};
use film_walk_database::diary_db;
use film_walk_database::store::DiaryStore;
use film_walk_diary_models::{CrawlOutcome, UserHandle};
use film_walk_scraper::PageFetcher;
use film_walk_scraper::diary::DiaryScraper;
use film_walk_scraper::discover::Discoverer;
use film_walk_scraper::retry::RetryPolicy;
use film_walk_scraper::site::SiteUrls;
use rand::Rng;

pub use config::CrawlerConfig;
pub use error::{CrawlError, ErrorPolicy};
use progress::{ProgressCallback, null_progress};
use stats::{CrawlStats, StatsReport};

/// Random-walk diary crawler over a fetcher, a random source and a store.
pub struct Crawler<F, R> {
    fetcher: F,
    discoverer: Discoverer<R>,
    diary: DiaryScraper,
    store: DiaryStore,
    stats: CrawlStats,
    retry: RetryPolicy,
    consecutive_failures: u32,
    progress: Arc<dyn ProgressCallback>,
}

impl<F: PageFetcher, R: Rng> Crawler<F, R> {
    /// Builds a crawler from a validated `config`.
    ///
    /// Statistics start from the totals already in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Config`] if `config` is invalid, or
    /// [`CrawlError::Persistence`] if the store totals cannot be read.
    pub fn new(
        config: &CrawlerConfig,
        fetcher: F,
        rng: R,
        store: DiaryStore,
    ) -> Result<Self, CrawlError> {
        config.validate()?;

        let site = SiteUrls::new(&config.base_url);
        let discoverer = Discoverer::new(site.clone(), rng)
            .map_err(|e| CrawlError::config(e.to_string()))?
            .with_max_member_page(config.max_member_page)
            .with_max_attempts(config.discovery_max_attempts);
        let diary = DiaryScraper::new(site)
            .map_err(|e| CrawlError::config(e.to_string()))?
            .with_fallback_year(config.fallback_year.unwrap_or_else(|| Local::now().year()))
            .with_max_pages(config.max_pages_per_user);

        let store = store.with_commit_every(config.commit_every);
        let users = diary_db::get_user_count(store.connection())?;
        let diaries = diary_db::get_diary_count(store.connection())?;
        log::info!("Store holds {users} users and {diaries} diaries");

        let stats = CrawlStats::new(Local::now(), users, diaries)
            .with_report_every(config.report_every)
            .with_targets(config.eta_targets.clone());

        Ok(Self {
            fetcher,
            discoverer,
            diary,
            store,
            stats,
            retry: config.retry,
            consecutive_failures: 0,
            progress: null_progress(),
        })
    }

    /// Reports progress to `progress` instead of discarding it.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    #[must_use]
    pub const fn store(&self) -> &DiaryStore {
        &self.store
    }

    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Scrapes and stages `handle` unless the store already knows it.
    ///
    /// Known users cost no page fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if the existence check or a diary page fetch
    /// fails. Nothing is staged in that case.
    pub async fn process_handle(&mut self, handle: &UserHandle) -> Result<CrawlOutcome, CrawlError> {
        if self.store.exists(handle.username())? {
            log::info!("User already scraped: {handle}.");
            return Ok(CrawlOutcome::AlreadyKnown);
        }

        let diary = self.diary.scrape(&self.fetcher, handle).await?;
        let entries = diary.entries.len() as u64;

        if self
            .store
            .record_user_diary(&diary, Local::now().naive_local())?
            .is_none()
        {
            return Ok(CrawlOutcome::AlreadyKnown);
        }

        log::info!(
            "{}: Scraped {entries} diaries for user {handle}.",
            self.stats.new_users() + 1
        );
        Ok(CrawlOutcome::NewlyScraped { entries })
    }

    /// Discovers one handle and processes it.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if discovery or processing fails.
    pub async fn step(&mut self) -> Result<CrawlOutcome, CrawlError> {
        let handle = self.discoverer.discover(&self.fetcher).await?;
        self.process_handle(&handle).await
    }

    /// Runs one step and does the per-step bookkeeping: failure policy,
    /// stats, commit cadence, periodic report.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] only for failures whose policy is
    /// [`ErrorPolicy::Fatal`].
    pub async fn tick(&mut self) -> Result<CrawlOutcome, CrawlError> {
        let outcome = match self.step().await {
            Ok(outcome) => {
                self.consecutive_failures = 0;
                outcome
            }
            Err(e) => self.handle_failure(e).await?,
        };

        self.stats.record(outcome);

        if let Some(summary) = self.store.maybe_commit(self.stats.processed()) {
            self.stats.rollback(summary.dropped_users, summary.dropped_diaries);
        }

        if self.stats.should_report() {
            self.stats.snapshot(Local::now()).log();
        }

        self.progress.inc(1);
        self.progress.set_message(format!(
            "{} new, {} processed",
            self.stats.new_users(),
            self.stats.processed()
        ));

        Ok(outcome)
    }

    async fn handle_failure(&mut self, e: CrawlError) -> Result<CrawlOutcome, CrawlError> {
        match e.policy() {
            ErrorPolicy::Retry => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let delay = self.retry.delay(self.consecutive_failures);
                log::warn!(
                    "Transient failure #{} ({e}), backing off {}ms",
                    self.consecutive_failures,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            ErrorPolicy::SkipUser => {
                self.consecutive_failures = 0;
                log::error!("Skipping handle: {e}");
            }
            ErrorPolicy::Fatal => return Err(e),
        }
        Ok(CrawlOutcome::Failed)
    }

    /// Crawls until `max_handles` handles have been processed (forever if
    /// `None`), then commits whatever is still staged.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] on a fatal failure.
    pub async fn run(&mut self, max_handles: Option<u64>) -> Result<StatsReport, CrawlError> {
        loop {
            if let Some(max) = max_handles
                && self.stats.processed() >= max
            {
                break;
            }
            self.tick().await?;
        }

        let summary = self.store.commit();
        self.stats.rollback(summary.dropped_users, summary.dropped_diaries);

        let report = self.stats.snapshot(Local::now());
        report.log();
        self.progress.finish(format!(
            "{} handles processed, {} new users",
            report.processed, report.new_users
        ));
        Ok(report)
    }
}

impl<F, R> std::fmt::Debug for Crawler<F, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("store", &self.store)
            .field("stats", &self.stats)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use film_walk_scraper::fetch::StaticFetcher;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    const BASE: &str = "https://letterboxd.com";

    const LANDING: &str = r#"<html><body><a href="/film/foo/">Foo</a></body></html>"#;

    const MEMBERS: &str = r#"<table><tr>
        <td class="table-person"><h3><a href="/alice/">Alice</a></h3></td>
    </tr></table>"#;

    const ALICE_PAGE_1: &str = r#"<table id="diary-table">
        <tr><th>Month</th><th>Day</th><th>Film</th><th>Released</th><th>Rating</th></tr>
        <tr>
            <td><a>Jan</a></td>
            <td><a>1</a></td>
            <td><h3><a href="/alice/film/foo/">Foo</a></h3></td>
            <td>2020</td>
            <td><span class="rating rated-6"></span></td>
        </tr>
    </table>"#;

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            max_member_page: 1,
            discovery_max_attempts: Some(2),
            fallback_year: Some(2024),
            commit_every: 1,
            retry: RetryPolicy::immediate(0),
            ..CrawlerConfig::default()
        }
    }

    fn alice_site() -> StaticFetcher {
        StaticFetcher::new()
            .with_page(format!("{BASE}/"), LANDING)
            .with_page(format!("{BASE}/film/foo/members/page/1"), MEMBERS)
            .with_page(format!("{BASE}/alice/films/diary/page/1"), ALICE_PAGE_1)
            .with_page(format!("{BASE}/alice/films/diary/page/2"), "<html></html>")
    }

    fn crawler(fetcher: StaticFetcher) -> Crawler<StaticFetcher, StdRng> {
        Crawler::new(
            &config(),
            fetcher,
            StdRng::seed_from_u64(7),
            DiaryStore::open_in_memory().unwrap(),
        )
        .unwrap()
    }

    fn diary_requests(fetcher: &StaticFetcher) -> usize {
        fetcher
            .requests()
            .iter()
            .filter(|url| url.contains("/films/diary/"))
            .count()
    }

    #[tokio::test]
    async fn end_to_end_single_user() {
        let mut crawler = crawler(alice_site());

        let report = crawler.run(Some(1)).await.unwrap();

        assert_eq!(report.new_users, 1);
        assert_eq!(report.total_diaries, 1);

        let conn = crawler.store().connection();
        let (username, num_diaries, num_rated): (String, i64, i64) = conn
            .query_row(
                r#"SELECT username, num_diaries, num_diaries_rated FROM "user""#,
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((username.as_str(), num_diaries, num_rated), ("alice", 1, 1));

        let movie: String = conn
            .query_row("SELECT url_movie FROM movie", [], |row| row.get(0))
            .unwrap();
        assert_eq!(movie, "/film/foo/");

        let rows = diary_db::get_user_diary(conn, "alice").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2024-01-01");
        assert_eq!(rows[0].rating, Some(6));
    }

    #[tokio::test]
    async fn known_user_is_not_fetched_again() {
        let mut crawler = crawler(alice_site());

        let report = crawler.run(Some(2)).await.unwrap();

        assert_eq!(report.new_users, 1);
        assert_eq!(report.known_users, 1);
        assert_eq!(diary_requests(crawler.fetcher()), 2);
        assert_eq!(diary_db::get_user_count(crawler.store().connection()).unwrap(), 1);
    }

    #[tokio::test]
    async fn process_handle_twice_is_idempotent() {
        let mut crawler = crawler(alice_site());
        let alice = UserHandle::parse(BASE, "/alice/").unwrap();

        let first = crawler.process_handle(&alice).await.unwrap();
        let second = crawler.process_handle(&alice).await.unwrap();

        assert_eq!(first, CrawlOutcome::NewlyScraped { entries: 1 });
        assert_eq!(second, CrawlOutcome::AlreadyKnown);
        assert_eq!(diary_requests(crawler.fetcher()), 2);
        assert_eq!(crawler.store().pending_users(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_counted_and_survived() {
        let fetcher = StaticFetcher::new().with_status(format!("{BASE}/"), 503);
        let mut crawler = crawler(fetcher);

        let report = crawler.run(Some(3)).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 3);
        assert_eq!(report.new_users, 0);
    }

    #[tokio::test]
    async fn missing_diary_page_skips_user() {
        let fetcher = StaticFetcher::new()
            .with_page(format!("{BASE}/"), LANDING)
            .with_page(format!("{BASE}/film/foo/members/page/1"), MEMBERS);
        let mut crawler = crawler(fetcher);

        let outcome = crawler.tick().await.unwrap();

        assert_eq!(outcome, CrawlOutcome::Failed);
        assert!(!crawler.store().exists("alice").unwrap());
    }

    #[tokio::test]
    async fn failed_commit_does_not_stop_the_crawl() {
        let mut crawler = crawler(alice_site());
        crawler
            .store()
            .connection()
            .execute_batch("DROP TABLE diary;")
            .unwrap();

        let outcome = crawler.tick().await.unwrap();

        assert_eq!(outcome, CrawlOutcome::NewlyScraped { entries: 1 });
        assert_eq!(crawler.stats().processed(), 1);
        assert_eq!(crawler.store().pending_users(), 0);
        assert_eq!(diary_db::get_user_count(crawler.store().connection()).unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_follow_the_store_after_a_dropped_user() {
        let mut crawler = crawler(alice_site());
        crawler
            .store()
            .connection()
            .execute_batch("DROP TABLE diary;")
            .unwrap();

        crawler.tick().await.unwrap();

        let report = crawler.stats().snapshot(Local::now());
        assert_eq!(report.new_users, 0);
        assert_eq!(report.total_users, 0);
        assert_eq!(report.total_diaries, 0);
        assert_eq!(diary_db::get_user_count(crawler.store().connection()).unwrap(), 0);

        crawler
            .store()
            .connection()
            .execute_batch(
                r#"CREATE TABLE diary (
                    id BIGINT PRIMARY KEY DEFAULT nextval('diary_id_seq'),
                    user_id BIGINT NOT NULL,
                    movie_id BIGINT NOT NULL,
                    "date" DATE NOT NULL,
                    rating SMALLINT
                );"#,
            )
            .unwrap();

        let outcome = crawler.tick().await.unwrap();

        assert_eq!(outcome, CrawlOutcome::NewlyScraped { entries: 1 });
        let conn = crawler.store().connection();
        let report = crawler.stats().snapshot(Local::now());
        assert_eq!(report.new_users, 1);
        assert_eq!(report.total_users, diary_db::get_user_count(conn).unwrap());
        assert_eq!(report.total_diaries, diary_db::get_diary_count(conn).unwrap());
        assert_eq!(report.processed, 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = CrawlerConfig {
            commit_every: 0,
            ..config()
        };
        let result = Crawler::new(
            &bad,
            StaticFetcher::new(),
            StdRng::seed_from_u64(1),
            DiaryStore::open_in_memory().unwrap(),
        );

        assert!(matches!(result, Err(CrawlError::Config { .. })));
    }
}
