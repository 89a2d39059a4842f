//! Crawl database schema and row-level operations.
//!
//! Three tables: `user` (one row per crawled username), `movie` (one row
//! per film path) and `diary` (one row per diary entry, joined to both by
//! surrogate id). Users and movies are insert-if-absent on their natural
//! keys; diary rows are plain inserts with no uniqueness constraint, so
//! callers must not record the same user twice.

use std::path::Path;

use duckdb::{Connection, params};
use film_walk_diary_models::{DiaryEntry, MovieRef, UserStats};

use crate::DbError;

/// Timestamp format used for the `user.timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Opens (or creates) the crawl database and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Opens a throwaway in-memory database with the schema applied.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        r#"CREATE SEQUENCE IF NOT EXISTS user_id_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS movie_id_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS diary_id_seq START 1;

        CREATE TABLE IF NOT EXISTS "user" (
            id BIGINT PRIMARY KEY DEFAULT nextval('user_id_seq'),
            username TEXT NOT NULL UNIQUE,
            num_diaries BIGINT NOT NULL,
            num_diaries_rated BIGINT NOT NULL,
            "timestamp" TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS movie (
            id BIGINT PRIMARY KEY DEFAULT nextval('movie_id_seq'),
            url_movie TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS diary (
            id BIGINT PRIMARY KEY DEFAULT nextval('diary_id_seq'),
            user_id BIGINT NOT NULL REFERENCES "user" (id),
            movie_id BIGINT NOT NULL REFERENCES movie (id),
            "date" DATE NOT NULL,
            rating SMALLINT
        );"#,
    )?;

    Ok(())
}

/// Returns whether `username` has been stored.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn user_exists(conn: &Connection, username: &str) -> Result<bool, DbError> {
    let mut stmt =
        conn.prepare(r#"SELECT EXISTS (SELECT 1 FROM "user" WHERE username = ?)"#)?;
    let exists: bool = stmt.query_row(params![username], |row| row.get(0))?;
    Ok(exists)
}

/// Inserts a user row unless one with the same username exists.
///
/// Returns `true` if a row was inserted.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn record_user(conn: &Connection, stats: &UserStats) -> Result<bool, DbError> {
    let timestamp = stats.timestamp.format(TIMESTAMP_FORMAT).to_string();

    let rows = conn.execute(
        r#"INSERT INTO "user" (username, num_diaries, num_diaries_rated, "timestamp")
        SELECT ?, ?, ?, CAST(? AS TIMESTAMP)
        WHERE NOT EXISTS (SELECT 1 FROM "user" WHERE username = ?)"#,
        params![
            stats.username,
            to_i64(stats.num_diaries)?,
            to_i64(stats.num_diaries_rated)?,
            timestamp,
            stats.username,
        ],
    )?;

    Ok(rows > 0)
}

/// Inserts a movie row unless one with the same path exists.
///
/// Returns `true` if a row was inserted.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn record_movie(conn: &Connection, movie: &MovieRef) -> Result<bool, DbError> {
    let rows = conn.execute(
        "INSERT INTO movie (url_movie)
        SELECT ?
        WHERE NOT EXISTS (SELECT 1 FROM movie WHERE url_movie = ?)",
        params![movie.as_str(), movie.as_str()],
    )?;

    Ok(rows > 0)
}

/// Inserts one diary row per entry, resolving user and movie ids by
/// username and film path.
///
/// Entries whose user or movie has not been recorded insert nothing.
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns [`DbError`] if any insert fails.
pub fn record_diary_entries(
    conn: &Connection,
    username: &str,
    entries: &[DiaryEntry],
) -> Result<u64, DbError> {
    if entries.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(
        r#"INSERT INTO diary (user_id, movie_id, "date", rating)
        SELECT u.id, m.id, CAST(? AS DATE), CAST(? AS SMALLINT)
        FROM "user" u
        JOIN movie m ON m.url_movie = ?
        WHERE u.username = ?"#,
    )?;

    let mut total = 0u64;

    for entry in entries {
        let date = entry.date.format("%Y-%m-%d").to_string();
        let rating = entry.rating.map(|r| i16::from(r.value()));

        let rows = stmt.execute(params![date, rating, entry.movie.as_str(), username])?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Returns the number of stored users.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_user_count(conn: &Connection) -> Result<u64, DbError> {
    count(conn, r#"SELECT COUNT(*) FROM "user""#)
}

/// Returns the number of stored movies.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_movie_count(conn: &Connection) -> Result<u64, DbError> {
    count(conn, "SELECT COUNT(*) FROM movie")
}

/// Returns the number of stored diary rows.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_diary_count(conn: &Connection) -> Result<u64, DbError> {
    count(conn, "SELECT COUNT(*) FROM diary")
}

fn count(conn: &Connection, sql: &str) -> Result<u64, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// A stored diary row in export form.
#[derive(Debug, Clone, PartialEq)]
pub struct DiaryRow {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Film path.
    pub movie_url: String,
    /// Rating code, if rated.
    pub rating: Option<i16>,
}

/// Returns `username`'s diary rows in insertion (site) order.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_user_diary(conn: &Connection, username: &str) -> Result<Vec<DiaryRow>, DbError> {
    let mut stmt = conn.prepare(
        r#"SELECT CAST(d."date" AS TEXT), m.url_movie, d.rating
        FROM diary d
        JOIN "user" u ON u.id = d.user_id
        JOIN movie m ON m.id = d.movie_id
        WHERE u.username = ?
        ORDER BY d.id"#,
    )?;

    let rows = stmt.query_map(params![username], |row| {
        Ok(DiaryRow {
            date: row.get(0)?,
            movie_url: row.get(1)?,
            rating: row.get(2)?,
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Per-user aggregate for the user index.
#[derive(Debug, Clone, PartialEq)]
pub struct UserIndexRow {
    /// Username.
    pub username: String,
    /// Stored diary rows.
    pub num_diaries: i64,
    /// Stored diary rows with a rating.
    pub num_ratings: i64,
    /// Mean rating code over rated rows, rounded to two decimals.
    pub avg_rating: Option<f64>,
}

/// Aggregates diary counts and mean rating for every stored user, ordered
/// by username.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_user_index(conn: &Connection) -> Result<Vec<UserIndexRow>, DbError> {
    let mut stmt = conn.prepare(
        r#"SELECT u.username, COUNT(d.id), COUNT(d.rating), ROUND(AVG(d.rating), 2)
        FROM "user" u
        LEFT JOIN diary d ON d.user_id = u.id
        GROUP BY u.username
        ORDER BY u.username"#,
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(UserIndexRow {
            username: row.get(0)?,
            num_diaries: row.get(1)?,
            num_ratings: row.get(2)?,
            avg_rating: row.get(3)?,
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn to_i64(value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("{value} does not fit in BIGINT"),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use film_walk_diary_models::Rating;

    use super::*;

    fn stats(username: &str, num_diaries: u64, num_diaries_rated: u64) -> UserStats {
        UserStats {
            username: username.to_owned(),
            num_diaries,
            num_diaries_rated,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
        }
    }

    fn entry(movie: &str, day: u32, rating: Option<u8>) -> DiaryEntry {
        DiaryEntry {
            movie: MovieRef::new(movie),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            rating: rating.map(|r| Rating::from_value(r).unwrap()),
        }
    }

    #[test]
    fn user_insert_is_idempotent() {
        let conn = open_in_memory().unwrap();

        assert!(!user_exists(&conn, "alice").unwrap());
        assert!(record_user(&conn, &stats("alice", 1, 1)).unwrap());
        assert!(!record_user(&conn, &stats("alice", 9, 9)).unwrap());

        assert!(user_exists(&conn, "alice").unwrap());
        assert_eq!(get_user_count(&conn).unwrap(), 1);

        let index = get_user_index(&conn).unwrap();
        assert_eq!(index[0].username, "alice");
    }

    #[test]
    fn movie_insert_is_idempotent() {
        let conn = open_in_memory().unwrap();
        let movie = MovieRef::new("/film/foo/");

        assert!(record_movie(&conn, &movie).unwrap());
        assert!(!record_movie(&conn, &movie).unwrap());
        assert_eq!(get_movie_count(&conn).unwrap(), 1);
    }

    #[test]
    fn diary_rows_join_user_and_movie() {
        let conn = open_in_memory().unwrap();
        record_user(&conn, &stats("alice", 2, 1)).unwrap();
        record_movie(&conn, &MovieRef::new("/film/foo/")).unwrap();
        record_movie(&conn, &MovieRef::new("/film/bar/")).unwrap();

        let inserted = record_diary_entries(
            &conn,
            "alice",
            &[entry("/film/foo/", 1, Some(6)), entry("/film/bar/", 2, None)],
        )
        .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(
            get_user_diary(&conn, "alice").unwrap(),
            vec![
                DiaryRow {
                    date: "2024-01-01".to_owned(),
                    movie_url: "/film/foo/".to_owned(),
                    rating: Some(6),
                },
                DiaryRow {
                    date: "2024-01-02".to_owned(),
                    movie_url: "/film/bar/".to_owned(),
                    rating: None,
                },
            ]
        );
    }

    #[test]
    fn diary_rows_are_not_deduplicated() {
        let conn = open_in_memory().unwrap();
        record_user(&conn, &stats("alice", 2, 0)).unwrap();
        record_movie(&conn, &MovieRef::new("/film/foo/")).unwrap();

        let same = entry("/film/foo/", 1, None);
        record_diary_entries(&conn, "alice", &[same.clone(), same]).unwrap();

        assert_eq!(get_diary_count(&conn).unwrap(), 2);
    }

    #[test]
    fn diary_row_without_movie_inserts_nothing() {
        let conn = open_in_memory().unwrap();
        record_user(&conn, &stats("alice", 1, 0)).unwrap();

        let inserted =
            record_diary_entries(&conn, "alice", &[entry("/film/unknown/", 1, None)]).unwrap();

        assert_eq!(inserted, 0);
    }

    #[test]
    fn user_index_aggregates_ratings() {
        let conn = open_in_memory().unwrap();
        record_user(&conn, &stats("bob", 3, 2)).unwrap();
        record_user(&conn, &stats("alice", 0, 0)).unwrap();
        record_movie(&conn, &MovieRef::new("/film/foo/")).unwrap();
        record_diary_entries(
            &conn,
            "bob",
            &[
                entry("/film/foo/", 1, Some(6)),
                entry("/film/foo/", 2, Some(9)),
                entry("/film/foo/", 3, None),
            ],
        )
        .unwrap();

        let index = get_user_index(&conn).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index[0].username, "alice");
        assert_eq!(index[0].num_diaries, 0);
        assert_eq!(index[0].avg_rating, None);
        assert_eq!(index[1].username, "bob");
        assert_eq!(index[1].num_diaries, 3);
        assert_eq!(index[1].num_ratings, 2);
        assert_eq!(index[1].avg_rating, Some(7.5));
    }
}
