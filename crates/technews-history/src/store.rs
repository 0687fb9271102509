//! Row types and operations on the `history` table.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use technews_core::DateConfidence;

use crate::{HistoryError, HistoryStore};

/// Retention horizon applied by [`HistoryStore::cleanup`] when the caller
/// does not supply a cut-off.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Chunk size for bulk `IN (...)` lookups, kept well under SQLite's
/// bound-parameter limit.
const IN_CHUNK: usize = 500;

/// A sighting to record, as assembled by the dedup pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub source: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub date_confidence: DateConfidence,
    pub title_hash: Option<String>,
    pub content_hash: Option<String>,
}

/// A row from the `history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    /// Stored as text; see [`HistoryRow::confidence`].
    pub date_confidence: String,
    pub source: String,
    pub title_hash: Option<String>,
    pub content_hash: Option<String>,
}

impl HistoryRow {
    #[must_use]
    pub fn confidence(&self) -> DateConfidence {
        DateConfidence::from_str_lossy(&self.date_confidence)
    }
}

/// Aggregate figures for the whole store.
#[derive(Debug, Clone)]
pub struct HistoryStats {
    pub total: i64,
    pub first_seen_min: Option<DateTime<Utc>>,
    pub first_seen_max: Option<DateTime<Utc>>,
    pub per_source: HashMap<String, i64>,
}

const SELECT_COLUMNS: &str = "id, url, normalized_url, title, first_seen_at, last_seen_at, \
                              published_at, date_confidence, source, title_hash, content_hash";

impl HistoryStore {
    /// Look up a single entry by its normalized URL.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the query fails.
    pub async fn find_by_normalized_url(
        &self,
        normalized_url: &str,
    ) -> Result<Option<HistoryRow>, HistoryError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM history WHERE normalized_url = ?"
        ))
        .bind(normalized_url)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Bulk existence test: which of `normalized_urls` are already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if a chunk query fails.
    pub async fn find_existing_urls(
        &self,
        normalized_urls: &[String],
    ) -> Result<HashSet<String>, HistoryError> {
        let mut existing = HashSet::new();

        for chunk in normalized_urls.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT normalized_url FROM history WHERE normalized_url IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql);
            for url in chunk {
                query = query.bind(url);
            }
            let rows = query.fetch_all(self.pool()).await?;
            for row in rows {
                existing.insert(row.get::<String, _>("normalized_url"));
            }
        }

        Ok(existing)
    }

    /// Entries sharing a title hash, used to narrow fuzzy-dedup candidates.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the query fails.
    pub async fn find_by_title_hash(
        &self,
        title_hash: &str,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM history WHERE title_hash = ?"
        ))
        .bind(title_hash)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Entries first seen in `[since, until]`, newest first. An open `until`
    /// means "up to now".
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the query fails.
    pub async fn find_by_date_range(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let rows = match until {
            Some(until) => {
                sqlx::query_as::<_, HistoryRow>(&format!(
                    "SELECT {SELECT_COLUMNS} FROM history \
                     WHERE first_seen_at >= ? AND first_seen_at <= ? \
                     ORDER BY first_seen_at DESC"
                ))
                .bind(since)
                .bind(until)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, HistoryRow>(&format!(
                    "SELECT {SELECT_COLUMNS} FROM history \
                     WHERE first_seen_at >= ? \
                     ORDER BY first_seen_at DESC"
                ))
                .bind(since)
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows)
    }

    /// Entries re-sighted at least `min_gap_days` after their first sighting —
    /// likely reposts or resurfaced evergreen articles.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the query fails.
    pub async fn find_potential_reposts(
        &self,
        min_gap_days: i64,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM history \
             WHERE julianday(last_seen_at) - julianday(first_seen_at) >= ? \
             ORDER BY first_seen_at DESC"
        ))
        .bind(min_gap_days as f64)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Insert a sighting, or merge it into the existing row.
    ///
    /// On conflict (`normalized_url` already present): `last_seen_at` is
    /// always advanced; `published_at`, `date_confidence`, and the hashes are
    /// filled only when previously empty; `first_seen_at` never moves.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the statement fails.
    pub async fn upsert(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        upsert_in(self.pool(), entry).await?;
        Ok(())
    }

    /// Upsert a batch atomically in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if any statement fails; the whole batch
    /// is rolled back in that case.
    pub async fn bulk_upsert(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let mut tx = self.pool().begin().await?;
        for entry in entries {
            upsert_in(&mut *tx, entry).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete entries first seen before `before`, or before the default
    /// 90-day retention horizon when `before` is `None`. Returns the number
    /// of rows removed.
    ///
    /// Cut-off is on `first_seen_at` only — a recently re-sighted old entry
    /// is still purged, preserving its recency signal for dedup until then.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if the delete fails.
    pub async fn cleanup(&self, before: Option<DateTime<Utc>>) -> Result<u64, HistoryError> {
        let cutoff =
            before.unwrap_or_else(|| Utc::now() - Duration::days(DEFAULT_RETENTION_DAYS));

        let result = sqlx::query("DELETE FROM history WHERE first_seen_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "purged history entries");
        }

        Ok(removed)
    }

    /// Totals, first-seen range, and per-source counts.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlx`] if a query fails.
    pub async fn stats(&self) -> Result<HistoryStats, HistoryError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history")
            .fetch_one(self.pool())
            .await?;

        let (first_seen_min, first_seen_max): (
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as("SELECT MIN(first_seen_at), MAX(first_seen_at) FROM history")
            .fetch_one(self.pool())
            .await?;

        let mut per_source = HashMap::new();
        let rows = sqlx::query("SELECT source, COUNT(*) AS n FROM history GROUP BY source")
            .fetch_all(self.pool())
            .await?;
        for row in rows {
            per_source.insert(row.get::<String, _>("source"), row.get::<i64, _>("n"));
        }

        Ok(HistoryStats {
            total,
            first_seen_min,
            first_seen_max,
            per_source,
        })
    }
}

async fn upsert_in<'e, E>(executor: E, entry: &HistoryEntry) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO history \
             (url, normalized_url, title, first_seen_at, last_seen_at, \
              published_at, date_confidence, source, title_hash, content_hash) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(normalized_url) DO UPDATE SET \
             last_seen_at    = excluded.last_seen_at, \
             published_at    = COALESCE(history.published_at, excluded.published_at), \
             date_confidence = CASE WHEN history.date_confidence = 'unknown' \
                                    THEN excluded.date_confidence \
                                    ELSE history.date_confidence END, \
             title_hash      = COALESCE(history.title_hash, excluded.title_hash), \
             content_hash    = COALESCE(history.content_hash, excluded.content_hash)",
    )
    .bind(&entry.url)
    .bind(&entry.normalized_url)
    .bind(&entry.title)
    .bind(entry.first_seen_at)
    .bind(entry.last_seen_at)
    .bind(entry.published_at)
    .bind(entry.date_confidence.to_string())
    .bind(&entry.source)
    .bind(&entry.title_hash)
    .bind(&entry.content_hash)
    .execute(executor)
    .await?;

    Ok(())
}
