//! Deduplicating, batch-committing store for crawl results.
//!
//! [`DiaryStore`] stages each newly scraped user (stats, movies and diary
//! rows) in memory and writes every staged user in a single transaction on
//! [`DiaryStore::commit`]. If that transaction fails it is rolled back and
//! the batch is written again one user per transaction, so a bad user only
//! drops itself and no user is ever persisted without all of its rows. Up
//! to `commit_every` handles of work are lost if the process dies between
//! commits.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::NaiveDateTime;
use duckdb::Connection;
use film_walk_diary_models::{MovieRef, UserDiary, UserStats};

use crate::{DbError, diary_db};

/// Default number of processed handles between commits.
pub const DEFAULT_COMMIT_EVERY: u64 = 100;

/// One user's rows, staged until the next commit.
#[derive(Debug, Clone)]
struct PendingUser {
    stats: UserStats,
    diary: UserDiary,
}

/// Totals written by one [`DiaryStore::commit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// User rows inserted.
    pub users: u64,
    /// Movie rows inserted (films not seen before).
    pub movies: u64,
    /// Diary rows inserted.
    pub diaries: u64,
    /// Staged users that were not persisted.
    pub dropped_users: u64,
    /// Diary entries of the dropped users.
    pub dropped_diaries: u64,
}

impl CommitSummary {
    const fn merge(&mut self, other: Self) {
        self.users += other.users;
        self.movies += other.movies;
        self.diaries += other.diaries;
        self.dropped_users += other.dropped_users;
        self.dropped_diaries += other.dropped_diaries;
    }
}

/// Crawl store with user-level dedup and a bounded commit cadence.
pub struct DiaryStore {
    conn: Connection,
    pending: Vec<PendingUser>,
    pending_usernames: HashSet<String>,
    commit_every: u64,
}

impl DiaryStore {
    /// Wraps an open connection whose schema is already in place.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            pending: Vec::new(),
            pending_usernames: HashSet::new(),
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }

    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        Ok(Self::new(diary_db::open(path)?))
    }

    /// Opens an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::new(diary_db::open_in_memory()?))
    }

    /// Sets how many processed handles pass between commits (at least 1).
    #[must_use]
    pub fn with_commit_every(mut self, commit_every: u64) -> Self {
        self.commit_every = commit_every.max(1);
        self
    }

    /// The underlying connection, for read-only queries and exports.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of users staged but not yet committed.
    #[must_use]
    pub fn pending_users(&self) -> usize {
        self.pending.len()
    }

    /// Returns whether `username` is stored or staged.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    pub fn exists(&self, username: &str) -> Result<bool, DbError> {
        if self.pending_usernames.contains(username) {
            return Ok(true);
        }
        diary_db::user_exists(&self.conn, username)
    }

    /// Stages a scraped user for the next commit.
    ///
    /// Returns the staged [`UserStats`], or `None` if the user is already
    /// stored or staged (a silent no-op).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the existence check fails.
    pub fn record_user_diary(
        &mut self,
        diary: &UserDiary,
        timestamp: NaiveDateTime,
    ) -> Result<Option<UserStats>, DbError> {
        let username = diary.handle.username();
        if self.exists(username)? {
            log::debug!("User {username} already recorded, not staging again");
            return Ok(None);
        }

        let stats = diary.stats(timestamp);
        self.pending_usernames.insert(username.to_owned());
        self.pending.push(PendingUser {
            stats: stats.clone(),
            diary: diary.clone(),
        });

        Ok(Some(stats))
    }

    /// Commits if `processed` handles is a multiple of the commit cadence.
    ///
    /// Returns `None` when no commit was due.
    pub fn maybe_commit(&mut self, processed: u64) -> Option<CommitSummary> {
        if processed == 0 || processed % self.commit_every != 0 {
            return None;
        }
        Some(self.commit())
    }

    /// Writes every staged user and clears the batch.
    ///
    /// The batch is written in one transaction. If that fails it is rolled
    /// back and each user is retried in its own transaction; users that
    /// still fail are rolled back, logged and counted in
    /// [`CommitSummary::dropped_users`].
    pub fn commit(&mut self) -> CommitSummary {
        let pending = std::mem::take(&mut self.pending);
        self.pending_usernames.clear();

        if pending.is_empty() {
            return CommitSummary::default();
        }

        let summary = match write_users(&mut self.conn, &pending) {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!(
                    "Batch commit of {} users failed, retrying one user per transaction: {e}",
                    pending.len()
                );
                let mut summary = CommitSummary::default();
                for user in &pending {
                    match write_users(&mut self.conn, std::slice::from_ref(user)) {
                        Ok(written) => summary.merge(written),
                        Err(e) => {
                            log::error!("Dropping user {}: {e}", user.stats.username);
                            summary.dropped_users += 1;
                            summary.dropped_diaries += user.diary.entries.len() as u64;
                        }
                    }
                }
                summary
            }
        };

        log::info!(
            "Committed {} users, {} new movies, {} diaries ({} users dropped)",
            summary.users,
            summary.movies,
            summary.diaries,
            summary.dropped_users,
        );

        summary
    }

    /// Commits anything still staged.
    pub fn close(mut self) -> CommitSummary {
        self.commit()
    }
}

/// Writes `users` in one transaction, rolled back on any error.
fn write_users(conn: &mut Connection, users: &[PendingUser]) -> Result<CommitSummary, DbError> {
    let tx = conn.transaction()?;
    let mut summary = CommitSummary::default();

    for user in users {
        if !diary_db::record_user(&tx, &user.stats)? {
            log::warn!("User {} appeared in the store mid-batch, skipping", user.stats.username);
            summary.dropped_users += 1;
            summary.dropped_diaries += user.diary.entries.len() as u64;
            continue;
        }
        summary.users += 1;

        let movies: BTreeSet<&MovieRef> = user.diary.entries.iter().map(|e| &e.movie).collect();
        for movie in movies {
            if diary_db::record_movie(&tx, movie)? {
                summary.movies += 1;
            }
        }

        summary.diaries += diary_db::record_diary_entries(&tx, &user.stats.username, &user.diary.entries)?;
    }

    tx.commit()?;
    Ok(summary)
}

impl std::fmt::Debug for DiaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiaryStore")
            .field("pending", &self.pending.len())
            .field("commit_every", &self.commit_every)
            .finish_non_exhaustive()
    }
}
