#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for crawled users, movies and diary entries.
//!
//! [`diary_db`] holds the schema and the row-level operations as free
//! functions over a [`duckdb::Connection`]. [`store::DiaryStore`] layers the
//! crawl's dedup and commit cadence on top: users are staged in memory and
//! written in one transaction per commit, so a user is never left
//! half-written. [`export`] writes the legacy per-user CSV and the user
//! index.

pub mod diary_db;
pub mod export;
pub mod paths;
pub mod store;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query or connection error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error (creating the data directory, writing exports).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
