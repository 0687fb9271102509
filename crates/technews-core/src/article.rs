use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much trust the date estimator places in a resolved date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateConfidence {
    High,
    Medium,
    Low,
    Unknown,
}

impl std::fmt::Display for DateConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateConfidence::High => write!(f, "high"),
            DateConfidence::Medium => write!(f, "medium"),
            DateConfidence::Low => write!(f, "low"),
            DateConfidence::Unknown => write!(f, "unknown"),
        }
    }
}

impl DateConfidence {
    /// Parse the stored text form back into a variant. Unrecognized values
    /// map to `Unknown` so old rows never fail to load.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "high" => DateConfidence::High,
            "medium" => DateConfidence::Medium,
            "low" => DateConfidence::Low,
            _ => DateConfidence::Unknown,
        }
    }
}

/// Which estimation layer produced the resolved date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    PublishedAt,
    UrlDate,
    RelativeTime,
    FirstSeenAt,
    None,
}

impl std::fmt::Display for DateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateSource::PublishedAt => write!(f, "published_at"),
            DateSource::UrlDate => write!(f, "url_date"),
            DateSource::RelativeTime => write!(f, "relative_time"),
            DateSource::FirstSeenAt => write!(f, "first_seen_at"),
            DateSource::None => write!(f, "none"),
        }
    }
}

/// Ranking weight a date source confers on an article in the final digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessPriority {
    High,
    Normal,
    Low,
}

/// An article as produced by the fetch executor, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArticle {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    /// Original publication timestamp as reported by the source, in any
    /// recognizable textual form.
    #[serde(default)]
    pub published_at: Option<String>,
    /// Auxiliary date hint: meta-tag content, a relative-time phrase, or a
    /// search-result snippet, depending on the source's date method.
    #[serde(default)]
    pub date_meta_content: Option<String>,
}

/// An article that survived the dedup pipeline, annotated with its canonical
/// URL and freshness estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredArticle {
    #[serde(flatten)]
    pub article: RawArticle,
    pub normalized_url: String,
    pub is_fresh: bool,
    pub date_confidence: DateConfidence,
    pub date_source: DateSource,
    #[serde(default)]
    pub resolved_date: Option<DateTime<Utc>>,
    pub freshness_priority: FreshnessPriority,
    /// Diagnostic from the fuzzy dedup layer, when a near-miss was scored.
    #[serde(default)]
    pub similarity_score: Option<f64>,
}
