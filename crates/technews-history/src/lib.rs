//! SQLite-backed history store for articles the pipeline has already seen.
//!
//! The store is the dedup engine's long-term memory: one row per normalized
//! URL, carrying first/last sighting timestamps and a title hash for fuzzy
//! candidate narrowing. WAL journaling keeps the single writer from blocking
//! the deduplicator's batched read lookups.

mod store;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use thiserror::Error;

pub use store::{HistoryEntry, HistoryRow, HistoryStats, DEFAULT_RETENTION_DAYS};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Handle to the on-disk history database.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (creating if missing) the history database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the database cannot be opened or the
    /// schema cannot be created.
    pub async fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HistoryError::Sqlx(sqlx::Error::Io(e))
                })?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        init_schema(&pool).await?;
        tracing::debug!(path = %path.display(), "history store opened");

        Ok(Self { pool })
    }

    /// Open an in-memory store. A single connection is used so every query
    /// sees the same database.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the connection fails.
    pub async fn open_in_memory() -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the underlying pool. Further calls will fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS history (
             id              INTEGER PRIMARY KEY AUTOINCREMENT,
             url             TEXT NOT NULL,
             normalized_url  TEXT NOT NULL UNIQUE,
             title           TEXT NOT NULL,
             first_seen_at   TEXT NOT NULL,
             last_seen_at    TEXT NOT NULL,
             published_at    TEXT,
             date_confidence TEXT NOT NULL DEFAULT 'unknown',
             source          TEXT NOT NULL,
             title_hash      TEXT,
             content_hash    TEXT
         )",
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_history_first_seen_at ON history(first_seen_at)",
        "CREATE INDEX IF NOT EXISTS idx_history_published_at ON history(published_at)",
        "CREATE INDEX IF NOT EXISTS idx_history_source ON history(source)",
        "CREATE INDEX IF NOT EXISTS idx_history_title_hash ON history(title_hash)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}
