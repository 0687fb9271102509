//! The staged deduplication pipeline.
//!
//! Stages run single-threaded and preserve input order: URL dedup within the
//! batch, history exclusion, intra-batch near-duplicate and fuzzy title
//! checks, freshness classification, then the history write-back. Articles
//! dropped as history re-sightings still get their `last_seen_at` advanced
//! in the final stage.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use technews_core::sources::DateMethod;
use technews_core::thresholds::DedupThresholds;
use technews_core::{DateConfidence, FilteredArticle, RawArticle};
use technews_history::{HistoryEntry, HistoryStore};
use thiserror::Error;

use crate::dates::{self, ParsedDate};
use crate::similarity;
use crate::urlnorm::{self, NormalizeOptions};

#[derive(Debug, Error)]
pub enum DedupError {
    #[error(transparent)]
    History(#[from] technews_history::HistoryError),
}

/// Per-source hints for the date estimator, taken from `SourceConfig`.
#[derive(Debug, Clone, Default)]
pub struct SourceDateHints {
    pub method: Option<DateMethod>,
    pub pattern: Option<String>,
}

/// Counts after each stage. Every count is bounded by the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub total_input: usize,
    pub after_url_dedup: usize,
    pub after_history_dedup: usize,
    pub after_similarity_dedup: usize,
    pub fresh_count: usize,
}

#[derive(Debug)]
pub struct DedupOutcome {
    pub articles: Vec<FilteredArticle>,
    pub stats: DedupStats,
}

/// One pipeline run's worth of configuration and collaborators.
pub struct Deduplicator<'a> {
    history: &'a HistoryStore,
    thresholds: &'a DedupThresholds,
    options: NormalizeOptions,
    date_hints: HashMap<String, SourceDateHints>,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
}

impl<'a> Deduplicator<'a> {
    #[must_use]
    pub fn new(
        history: &'a HistoryStore,
        thresholds: &'a DedupThresholds,
        options: NormalizeOptions,
        date_hints: HashMap<String, SourceDateHints>,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            history,
            thresholds,
            options,
            date_hints,
            window_start,
            now,
        }
    }

    /// Run all stages over one collected batch.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError::History`] if a history lookup or the final
    /// write-back fails; dedup cannot be guaranteed correct without the
    /// store, so these are not swallowed.
    pub async fn run(&self, batch: Vec<RawArticle>) -> Result<DedupOutcome, DedupError> {
        let total_input = batch.len();

        // Stage 1: attach normalized URLs and drop intra-batch URL repeats.
        // Normalization failure falls back to the raw URL rather than
        // aborting the batch.
        let mut seen_urls = HashSet::new();
        let mut staged: Vec<(RawArticle, String)> = Vec::new();
        for article in batch {
            let normalized = match urlnorm::normalize(&article.url, &self.options) {
                Ok(normalized) => normalized,
                Err(e) => {
                    tracing::debug!(url = %article.url, error = %e, "keeping raw URL");
                    article.url.clone()
                }
            };
            if seen_urls.insert(normalized.clone()) {
                staged.push((article, normalized));
            }
        }
        let after_url_dedup = staged.len();

        // Stage 2: drop articles the history store has already seen. The
        // dropped ones are remembered so the final stage can advance their
        // last_seen_at.
        let lookup: Vec<String> = staged.iter().map(|(_, n)| n.clone()).collect();
        let existing = self.history.find_existing_urls(&lookup).await?;
        let mut resighted: Vec<(RawArticle, String)> = Vec::new();
        let mut survivors: Vec<(RawArticle, String)> = Vec::new();
        for (article, normalized) in staged {
            if existing.contains(&normalized) {
                resighted.push((article, normalized));
            } else {
                survivors.push((article, normalized));
            }
        }
        let after_history_dedup = survivors.len();

        // Stage 3: intra-batch near-duplicate titles (Jaccard only, with
        // same/cross-domain cut-offs by the candidate's source).
        let mut accepted: Vec<(RawArticle, String)> = Vec::new();
        for (article, normalized) in survivors {
            let fallback = self.thresholds.layer2_for_source(&article.source);
            let domain = urlnorm::extract_domain(&normalized).unwrap_or_default();
            let duplicate = accepted.iter().any(|(prev, prev_normalized)| {
                let prev_domain =
                    urlnorm::extract_domain(prev_normalized).unwrap_or_default();
                let same_domain = !domain.is_empty() && domain == prev_domain;
                similarity::near_duplicate(&article.title, &prev.title, same_domain, &fallback)
            });
            if duplicate {
                tracing::debug!(title = %article.title, source = %article.source, "near-duplicate title dropped");
            } else {
                accepted.push((article, normalized));
            }
        }

        // Stage 4: fuzzy titles (Jaccard-or-edit with category thresholds).
        // The best-scoring hit is recorded on the kept article as a
        // similarity diagnostic.
        let mut kept: Vec<(RawArticle, String, Option<f64>)> = Vec::new();
        for (article, normalized) in accepted {
            let category = similarity::detect_category(&article.source, &normalized);
            let thresholds = self.thresholds.for_category(category);
            let mut best: Option<(usize, f64)> = None;
            for (idx, (prev, _, _)) in kept.iter().enumerate() {
                if let Some(hit) =
                    similarity::fuzzy_match(&article.title, &prev.title, &thresholds)
                {
                    let score = hit.score();
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((idx, score));
                    }
                }
            }
            match best {
                Some((idx, score)) => {
                    tracing::debug!(
                        title = %article.title,
                        matched = %kept[idx].0.title,
                        score,
                        category,
                        "fuzzy duplicate dropped"
                    );
                    let diagnostic = &mut kept[idx].2;
                    *diagnostic = Some(diagnostic.map_or(score, |s| s.max(score)));
                }
                None => kept.push((article, normalized, None)),
            }
        }
        let after_similarity_dedup = kept.len();

        // Stage 5: freshness. Keep on doubt: an unknown-confidence article
        // is never dropped for being stale.
        let mut fresh_count = 0usize;
        let mut articles: Vec<FilteredArticle> = Vec::new();
        for (article, normalized, similarity_score) in kept {
            let parsed = self.estimate_date(&article);
            let freshness = dates::classify_freshness(&parsed, self.window_start, None);
            if !freshness.is_fresh && parsed.confidence != DateConfidence::Unknown {
                tracing::debug!(
                    title = %article.title,
                    resolved = ?freshness.resolved,
                    "stale article dropped"
                );
                continue;
            }
            if freshness.is_fresh {
                fresh_count += 1;
            }
            articles.push(FilteredArticle {
                article,
                normalized_url: normalized,
                is_fresh: freshness.is_fresh,
                date_confidence: parsed.confidence,
                date_source: freshness.source,
                resolved_date: freshness.resolved,
                freshness_priority: freshness.priority,
                similarity_score,
            });
        }

        // Stage 6: write survivors into history, and re-sighted URLs with
        // them so their last_seen_at advances. Merge semantics in the store
        // keep first_seen_at and previously-filled fields intact.
        let mut entries: Vec<HistoryEntry> = articles
            .iter()
            .map(|filtered| HistoryEntry {
                url: filtered.article.url.clone(),
                normalized_url: filtered.normalized_url.clone(),
                title: filtered.article.title.clone(),
                source: filtered.article.source.clone(),
                first_seen_at: self.now,
                last_seen_at: self.now,
                published_at: filtered.resolved_date,
                date_confidence: filtered.date_confidence,
                title_hash: Some(similarity::title_hash(&filtered.article.title)),
                content_hash: None,
            })
            .collect();
        entries.extend(resighted.iter().map(|(article, normalized)| HistoryEntry {
            url: article.url.clone(),
            normalized_url: normalized.clone(),
            title: article.title.clone(),
            source: article.source.clone(),
            first_seen_at: self.now,
            last_seen_at: self.now,
            published_at: None,
            date_confidence: DateConfidence::Unknown,
            title_hash: Some(similarity::title_hash(&article.title)),
            content_hash: None,
        }));
        self.history.bulk_upsert(&entries).await?;

        let stats = DedupStats {
            total_input,
            after_url_dedup,
            after_history_dedup,
            after_similarity_dedup,
            fresh_count,
        };
        tracing::info!(
            total = stats.total_input,
            after_url = stats.after_url_dedup,
            after_history = stats.after_history_dedup,
            after_similarity = stats.after_similarity_dedup,
            fresh = stats.fresh_count,
            "dedup pipeline finished"
        );

        Ok(DedupOutcome { articles, stats })
    }

    fn estimate_date(&self, article: &RawArticle) -> ParsedDate {
        if let Some(published) = article.published_at.as_deref() {
            if let Some(date) = dates::parse_explicit(published) {
                return ParsedDate {
                    date: Some(date),
                    confidence: DateConfidence::High,
                    source: technews_core::DateSource::PublishedAt,
                };
            }
        }

        let meta = article.date_meta_content.as_deref();
        let hints = self.date_hints.get(&article.source);
        match hints.and_then(|h| h.method.map(|m| (m, h.pattern.as_deref()))) {
            Some((method, pattern)) => {
                dates::parse_by_method(method, &article.url, meta, pattern, self.now)
            }
            None => dates::parse_multi_layer(
                article.published_at.as_deref(),
                &article.url,
                meta,
                self.now,
            ),
        }
    }
}
