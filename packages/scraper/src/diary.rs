//! Paginated diary table scraper.
//!
//! Walks `films/diary/page/{n}` for one user, starting at page 1, and
//! parses the `table#diary-table` on each page. The walk stops at the first
//! page without the table (no diary, or past the end) or whose table has
//! no data rows.
//!
//! The site prints the month label only on the first row of each run of
//! same-month rows, so the parser carries the most recent month forward
//! through the rest of the page and across page boundaries. A label that
//! does not name a year is combined with a fallback year; no year rollover
//! is inferred from row order.

use std::str::FromStr as _;
use std::sync::LazyLock;

use chrono::{Datelike as _, Month, NaiveDate};
use film_walk_diary_models::{DiaryEntry, MovieRef, UserDiary, UserHandle};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::rating::{RatingError, extract_rating};
use crate::site::SiteUrls;
use crate::{PageFetcher, ScrapeError, parse_selector};

/// CSS selector for the diary table.
pub const DIARY_TABLE_SELECTOR: &str = "table#diary-table";

const MONTH_CELL: usize = 0;
const DAY_CELL: usize = 1;
const FILM_CELL: usize = 2;
const RATING_CELL: usize = 4;

static LABEL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+|\d+").unwrap_or_else(|_| unreachable!()));

/// Why a single diary row was dropped.
///
/// These are data anomalies: the row is skipped and the rest of the diary
/// is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    /// The rating fragment could not be normalized.
    #[error(transparent)]
    Rating(#[from] RatingError),

    /// The row has fewer cells than the diary layout.
    #[error("row has {found} cells, expected at least {}", RATING_CELL + 1)]
    MissingCells {
        /// Number of `td` cells found.
        found: usize,
    },

    /// No month label has been seen yet on this diary.
    #[error("row has no month label and none to inherit")]
    MissingMonth,

    /// The month label could not be read.
    #[error("unreadable month label {0:?}")]
    InvalidMonth(String),

    /// Day and month do not form a calendar date.
    #[error("invalid date: day {day:?} of {month} {year}")]
    InvalidDate {
        /// The raw day cell text.
        day: String,
        /// The carried month.
        month: String,
        /// The year used.
        year: i32,
    },

    /// The film cell has no link.
    #[error("row has no film link")]
    MissingFilm,
}

/// A month label as printed in the diary's month column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthLabel {
    /// The calendar month.
    pub month: Month,
    /// The year, when the label prints one.
    pub year: Option<i32>,
}

/// Parses a month label such as `"Jan"`, `"January"` or `"Jan 2024"`.
///
/// Returns `None` if no month name is present.
#[must_use]
pub fn parse_month_label(text: &str) -> Option<MonthLabel> {
    let mut month = None;
    let mut year = None;

    for token in LABEL_TOKEN.find_iter(text).map(|m| m.as_str()) {
        if token.as_bytes()[0].is_ascii_digit() {
            if token.len() == 4 && year.is_none() {
                year = token.parse().ok();
            }
        } else if month.is_none() {
            month = Month::from_str(token).ok();
        }
    }

    month.map(|month| MonthLabel { month, year })
}

/// Combines a day cell with the carried month label.
///
/// # Errors
///
/// Returns [`EntryError::InvalidDate`] if the day is not a number or the
/// result is not a calendar date.
pub fn reconstruct_date(
    day_text: &str,
    label: MonthLabel,
    fallback_year: i32,
) -> Result<NaiveDate, EntryError> {
    let year = label.year.unwrap_or(fallback_year);
    let day = day_text.trim();

    day.parse::<u32>()
        .ok()
        .and_then(|d| NaiveDate::from_ymd_opt(year, label.month.number_from_month(), d))
        .ok_or_else(|| EntryError::InvalidDate {
            day: day.to_owned(),
            month: label.month.name().to_owned(),
            year,
        })
}

/// Outcome of parsing one diary page.
enum PageParse {
    /// The page has no diary table.
    NoTable,
    /// The table has only its header row.
    Empty,
    /// One result per data row, in page order.
    Rows(Vec<Result<DiaryEntry, EntryError>>),
}

/// Scrapes a user's full diary, page by page.
#[derive(Debug, Clone)]
pub struct DiaryScraper {
    site: SiteUrls,
    /// Year for month labels that do not print one.
    fallback_year: i32,
    /// Safety valve on pages fetched per user.
    max_pages: Option<u32>,
    table_selector: Selector,
    row_selector: Selector,
    cell_selector: Selector,
    link_selector: Selector,
    span_selector: Selector,
}

impl DiaryScraper {
    /// Creates a scraper for `site`. The fallback year defaults to the
    /// current local year.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Parse`] if a built-in selector fails to parse.
    pub fn new(site: SiteUrls) -> Result<Self, ScrapeError> {
        Ok(Self {
            site,
            fallback_year: chrono::Local::now().year(),
            max_pages: None,
            table_selector: parse_selector(DIARY_TABLE_SELECTOR)?,
            row_selector: parse_selector("tr")?,
            cell_selector: parse_selector("td")?,
            link_selector: parse_selector("a[href]")?,
            span_selector: parse_selector("span")?,
        })
    }

    /// Overrides the year used for month labels without one.
    #[must_use]
    pub const fn with_fallback_year(mut self, year: i32) -> Self {
        self.fallback_year = year;
        self
    }

    /// Caps the number of pages fetched per user.
    #[must_use]
    pub const fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Fetches and parses every diary page of `handle`.
    ///
    /// A profile without a diary yields an empty [`UserDiary`]. Rows that
    /// fail to parse are logged, counted in [`UserDiary::skipped`] and
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if any page fetch fails; entries collected
    /// from earlier pages are discarded.
    pub async fn scrape<F: PageFetcher>(
        &self,
        fetcher: &F,
        handle: &UserHandle,
    ) -> Result<UserDiary, ScrapeError> {
        let mut diary = UserDiary::new(handle.clone());
        let mut carried_month: Option<MonthLabel> = None;
        let mut page: u32 = 1;

        loop {
            if let Some(max) = self.max_pages
                && page > max
            {
                log::info!("Reached max diary pages ({max}) for {handle}, stopping");
                break;
            }

            let html = fetcher.fetch(&self.site.diary_page(handle, page)).await?;
            diary.pages_fetched += 1;

            let rows = match self.parse_page(&html, handle.username(), &mut carried_month) {
                PageParse::NoTable => {
                    if page == 1 {
                        log::info!("User has no diaries: {handle}.");
                    }
                    break;
                }
                PageParse::Empty => break,
                PageParse::Rows(rows) => rows,
            };

            for (index, row) in rows.into_iter().enumerate() {
                match row {
                    Ok(entry) => diary.entries.push(entry),
                    Err(e) => {
                        log::warn!("Skipping diary row {} on page {page} for {handle}: {e}", index + 1);
                        diary.skipped += 1;
                    }
                }
            }

            page += 1;
        }

        log::debug!(
            "Scraped {} diary entries ({} skipped) over {} pages for {handle}",
            diary.entries.len(),
            diary.skipped,
            diary.pages_fetched,
        );

        Ok(diary)
    }

    fn parse_page(
        &self,
        html: &str,
        username: &str,
        carried_month: &mut Option<MonthLabel>,
    ) -> PageParse {
        let document = Html::parse_document(html);

        let Some(table) = document.select(&self.table_selector).next() else {
            return PageParse::NoTable;
        };

        // First row is the header.
        let rows: Vec<ElementRef<'_>> = table.select(&self.row_selector).skip(1).collect();
        if rows.is_empty() {
            return PageParse::Empty;
        }

        PageParse::Rows(
            rows.into_iter()
                .map(|row| self.parse_row(row, username, carried_month))
                .collect(),
        )
    }

    fn parse_row(
        &self,
        row: ElementRef<'_>,
        username: &str,
        carried_month: &mut Option<MonthLabel>,
    ) -> Result<DiaryEntry, EntryError> {
        let cells: Vec<ElementRef<'_>> = row.select(&self.cell_selector).collect();
        if cells.len() <= RATING_CELL {
            return Err(EntryError::MissingCells { found: cells.len() });
        }

        let month_text = cell_text(cells[MONTH_CELL]);
        if !month_text.is_empty() {
            *carried_month = parse_month_label(&month_text);
            if carried_month.is_none() {
                return Err(EntryError::InvalidMonth(month_text));
            }
        }
        let label = carried_month.ok_or(EntryError::MissingMonth)?;

        let date = reconstruct_date(&cell_text(cells[DAY_CELL]), label, self.fallback_year)?;

        let href = cells[FILM_CELL]
            .select(&self.link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or(EntryError::MissingFilm)?;
        let movie = MovieRef::from_diary_href(href, username);

        let fragment = cells[RATING_CELL]
            .select(&self.span_selector)
            .next()
            .map(|span| span.html())
            .unwrap_or_default();
        let rating = extract_rating(&fragment)?;

        Ok(DiaryEntry {
            movie,
            date,
            rating,
        })
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_owned()
}
