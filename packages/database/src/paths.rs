#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the `data/` directory.
//!
//! All paths are relative to the project root's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`; falls back to the
/// current directory if the manifest has fewer ancestors than expected.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the default crawl database path.
#[must_use]
pub fn crawler_db_path() -> PathBuf {
    data_dir().join("film_walk.duckdb")
}

/// Returns the `data/exports/` directory for CSV exports.
#[must_use]
pub fn exports_dir() -> PathBuf {
    data_dir().join("exports")
}

/// Returns the default legacy diary export path for `username`.
#[must_use]
pub fn diary_export_path(username: &str) -> PathBuf {
    exports_dir().join("diary").join(format!("{username}.csv"))
}

/// Returns the default user index export path.
#[must_use]
pub fn user_index_path() -> PathBuf {
    exports_dir().join("user_index.csv")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
