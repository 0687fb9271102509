//! Weighted search-query generation from query groups and tag synonyms.
//!
//! Group weights are scaled by how often the group's keywords (and their
//! synonyms) showed up in recently collected titles versus the all-time
//! corpus, then queries are emitted per keyword, optionally combined
//! pairwise, and cut down to a ranked top-N.

use technews_core::{QueriesFile, QueryGroup, TagSynonyms};

/// A search query carrying its group's final weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedQuery {
    pub text: String,
    pub group_id: String,
    pub weight: f64,
}

pub struct QueryGenerator<'a> {
    file: &'a QueriesFile,
    synonyms: &'a TagSynonyms,
}

impl<'a> QueryGenerator<'a> {
    #[must_use]
    pub fn new(file: &'a QueriesFile, synonyms: &'a TagSynonyms) -> Self {
        Self { file, synonyms }
    }

    /// Produce the ranked top-N weighted queries.
    ///
    /// `recent_titles` and `all_titles` are the corpora the recency and
    /// frequency factors are computed against; either may be empty, in which
    /// case the corresponding factor collapses to the band midpoint of zero
    /// matches (zero-safe).
    #[must_use]
    pub fn generate(&self, recent_titles: &[String], all_titles: &[String]) -> Vec<WeightedQuery> {
        let groups = &self.file.query_groups;

        let recent_counts: Vec<usize> = groups
            .iter()
            .map(|g| self.count_matches(g, recent_titles))
            .collect();
        let all_counts: Vec<usize> = groups
            .iter()
            .map(|g| self.count_matches(g, all_titles))
            .collect();
        let max_recent = recent_counts.iter().copied().max().unwrap_or(0);
        let max_all = all_counts.iter().copied().max().unwrap_or(0);

        let mut queries = Vec::new();
        for (idx, group) in groups.iter().enumerate() {
            let recency_ratio = ratio(recent_counts[idx], max_recent);
            let frequency_ratio = ratio(all_counts[idx], max_all);
            let weight = group.weight
                * self.file.recency_band.apply(recency_ratio)
                * self.file.frequency_band.apply(frequency_ratio);

            for keyword in &group.keywords {
                queries.push(WeightedQuery {
                    text: keyword.clone(),
                    group_id: group.id.clone(),
                    weight,
                });
            }

            if self.file.combined_queries.enabled {
                let mut emitted = 0usize;
                'pairs: for (i, a) in group.keywords.iter().enumerate() {
                    for b in group.keywords.iter().skip(i + 1) {
                        if emitted >= self.file.combined_queries.max_combinations {
                            break 'pairs;
                        }
                        queries.push(WeightedQuery {
                            text: format!("{a} {b}"),
                            group_id: group.id.clone(),
                            weight: weight * 0.9,
                        });
                        emitted += 1;
                    }
                }
            }
        }

        // Rank by weight, tie-broken by text for determinism.
        queries.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });
        queries.truncate(self.file.selection.top_n);
        queries
    }

    /// Titles in which any of the group's keywords (or their synonyms)
    /// appear, case-insensitively.
    fn count_matches(&self, group: &QueryGroup, titles: &[String]) -> usize {
        titles
            .iter()
            .filter(|title| {
                let title = title.to_lowercase();
                group.keywords.iter().any(|keyword| {
                    self.synonyms
                        .expansions(keyword)
                        .iter()
                        .any(|term| title.contains(&term.to_lowercase()))
                })
            })
            .count()
    }
}

fn ratio(count: usize, max: usize) -> f64 {
    if max == 0 {
        0.0
    } else {
        count as f64 / max as f64
    }
}

/// Walk the ranked list and pick at most `max_per_source` queries, no two
/// from the same group.
#[must_use]
pub fn allocate_for_source(queries: &[WeightedQuery], max_per_source: usize) -> Vec<WeightedQuery> {
    let mut picked: Vec<WeightedQuery> = Vec::new();
    for query in queries {
        if picked.len() >= max_per_source {
            break;
        }
        if picked.iter().any(|p| p.group_id == query.group_id) {
            continue;
        }
        picked.push(query.clone());
    }
    picked
}
