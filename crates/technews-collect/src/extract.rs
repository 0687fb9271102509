//! Locating and normalizing article JSON inside free-form agent output.
//!
//! Agents are asked for fenced JSON but don't always comply; the cascade
//! tries progressively looser readings of the raw content until one yields
//! an `articles`-bearing object or a bare array.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use technews_core::RawArticle;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").unwrap());
static FENCED_ANY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*([\[{].*?)```").unwrap());

/// Maximum length of the diagnostic preview attached to parse errors.
const PREVIEW_CHARS: usize = 120;

/// Try each extraction rule in order until one yields an article list.
///
/// Rules: every ```json block, then any fenced block starting with `{`/`[`,
/// then the whole trimmed content if it starts with `{`/`[`, then the
/// substring from the first `{` to the last `}`.
#[must_use]
pub fn extract_articles(content: &str) -> Option<Vec<Value>> {
    for caps in FENCED_JSON.captures_iter(content) {
        if let Some(articles) = parse_candidate(caps[1].trim()) {
            return Some(articles);
        }
    }

    for caps in FENCED_ANY.captures_iter(content) {
        if let Some(articles) = parse_candidate(caps[1].trim()) {
            return Some(articles);
        }
    }

    let trimmed = content.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(articles) = parse_candidate(trimmed) {
            return Some(articles);
        }
    }

    if let (Some(open), Some(close)) = (content.find('{'), content.rfind('}')) {
        if open < close {
            if let Some(articles) = parse_candidate(&content[open..=close]) {
                return Some(articles);
            }
        }
    }

    None
}

fn parse_candidate(candidate: &str) -> Option<Vec<Value>> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("articles") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ArticlePayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, alias = "publishedAt")]
    published_at: Option<String>,
    #[serde(default, alias = "dateMetaContent", alias = "date_snippet")]
    date_meta_content: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Keep only entries with a non-empty title and URL, coerce blank optionals
/// to absent, and stamp the source id and collection time.
#[must_use]
pub fn normalize_articles(
    values: Vec<Value>,
    source_id: &str,
    collected_at: DateTime<Utc>,
) -> Vec<RawArticle> {
    values
        .into_iter()
        .filter_map(|value| {
            let payload: ArticlePayload = serde_json::from_value(value).ok()?;
            let title = non_empty(payload.title)?;
            let url = non_empty(payload.url)?;
            Some(RawArticle {
                url,
                title,
                summary: non_empty(payload.summary),
                source: source_id.to_string(),
                collected_at,
                published_at: non_empty(payload.published_at),
                date_meta_content: non_empty(payload.date_meta_content),
            })
        })
        .collect()
}

/// Whitespace-collapsed prefix of the raw content, for parse-error
/// diagnostics.
#[must_use]
pub fn raw_preview(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(PREVIEW_CHARS).collect()
}
