//! CSV exports of stored crawl data.
//!
//! - Per-user diary in the legacy flat format: header `date,movie_url,rating`,
//!   one row per entry, empty rating cell when unrated.
//! - User index: `username,num_diaries,num_ratings,avg_rating` for every
//!   stored user.

use std::io::Write;
use std::path::Path;

use duckdb::Connection;

use crate::{DbError, diary_db};

/// Writes `username`'s stored diary as legacy CSV to `writer`.
///
/// Returns the number of data rows written.
///
/// # Errors
///
/// Returns [`DbError`] if the query or CSV write fails.
pub fn write_user_diary_csv<W: Write>(
    conn: &Connection,
    username: &str,
    writer: W,
) -> Result<usize, DbError> {
    let rows = diary_db::get_user_diary(conn, username)?;

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["date", "movie_url", "rating"])?;
    for row in &rows {
        let rating = row.rating.map(|r| r.to_string()).unwrap_or_default();
        csv.write_record([row.date.as_str(), row.movie_url.as_str(), rating.as_str()])?;
    }
    csv.flush()?;

    Ok(rows.len())
}

/// Writes `username`'s stored diary as legacy CSV to `path`, creating the
/// parent directory if needed.
///
/// # Errors
///
/// Returns [`DbError`] if the query, directory creation or write fails.
pub fn export_user_diary(conn: &Connection, username: &str, path: &Path) -> Result<usize, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let count = write_user_diary_csv(conn, username, file)?;
    log::info!("Exported {count} diaries for {username} to {}", path.display());
    Ok(count)
}

/// Writes the user index CSV to `writer`.
///
/// Returns the number of users written.
///
/// # Errors
///
/// Returns [`DbError`] if the query or CSV write fails.
pub fn write_user_index_csv<W: Write>(conn: &Connection, writer: W) -> Result<usize, DbError> {
    let rows = diary_db::get_user_index(conn)?;

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["username", "num_diaries", "num_ratings", "avg_rating"])?;
    for row in &rows {
        let avg = row.avg_rating.map(|a| format!("{a:.2}")).unwrap_or_default();
        csv.write_record([
            row.username.clone(),
            row.num_diaries.to_string(),
            row.num_ratings.to_string(),
            avg,
        ])?;
    }
    csv.flush()?;

    Ok(rows.len())
}

/// Writes the user index CSV to `path`, creating the parent directory if
/// needed.
///
/// # Errors
///
/// Returns [`DbError`] if the query, directory creation or write fails.
pub fn export_user_index(conn: &Connection, path: &Path) -> Result<usize, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let count = write_user_index_csv(conn, file)?;
    log::info!("Indexed {count} users to {}", path.display());
    Ok(count)
}
