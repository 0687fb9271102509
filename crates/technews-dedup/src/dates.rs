//! Three-layer date estimation and the freshness window.
//!
//! Layer 1 parses explicit timestamps, layer 2 recovers dates from URL
//! paths, layer 3 interprets Japanese/English relative-time phrases against
//! a caller-supplied reference time. When every layer fails the estimator
//! returns the "none" sentinel and downstream keeps the article on doubt.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use technews_core::{DateConfidence, DateSource, FreshnessPriority};
use technews_core::sources::DateMethod;

/// Outcome of one date-estimation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub date: Option<DateTime<Utc>>,
    pub confidence: DateConfidence,
    pub source: DateSource,
}

impl ParsedDate {
    /// The sentinel returned when no layer resolves a date: downstream falls
    /// back on first-sighting bookkeeping.
    #[must_use]
    pub fn unresolved() -> Self {
        Self {
            date: None,
            confidence: DateConfidence::Unknown,
            source: DateSource::FirstSeenAt,
        }
    }
}

const EXPLICIT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const EXPLICIT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%B %d, %Y"];

/// Layer 1: parse an explicit timestamp string in any recognizable form.
#[must_use]
pub fn parse_explicit(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in EXPLICIT_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in EXPLICIT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(midnight_utc(date));
        }
    }

    None
}

static URL_PATH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:[/?#]|$)").unwrap());
static URL_QUERY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]date=(\d{4})[-/](\d{1,2})[-/](\d{1,2})").unwrap());
static URL_COMPACT_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/articles?/(\d{4})(\d{2})(\d{2})(?:[^0-9]|$)").unwrap());

/// Layer 2: recover a date from the URL itself. Resolves to midnight UTC.
///
/// `override_pattern` replaces the built-in pattern list; it must capture
/// year, month, and day as its first three groups.
#[must_use]
pub fn parse_url_date(url: &str, override_pattern: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(pattern) = override_pattern {
        let re = Regex::new(pattern).ok()?;
        return date_from_captures(&re, url);
    }

    for re in [&*URL_PATH_DATE, &*URL_QUERY_DATE, &*URL_COMPACT_DATE] {
        if let Some(date) = date_from_captures(re, url) {
            return Some(date);
        }
    }

    None
}

fn date_from_captures(re: &Regex, url: &str) -> Option<DateTime<Utc>> {
    let caps = re.captures(url)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(midnight_utc)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}

static JA_RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(秒|分|時間|日|週間|ヶ月|か月)前").unwrap());
static EN_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(second|minute|hour|day|week|month)s?\s+ago").unwrap()
});
static EN_LAST_WEEK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blast\s+week\b").unwrap());
static EN_YESTERDAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\byesterday\b").unwrap());
static EN_TODAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btoday\b").unwrap());

/// Layer 3: interpret a Japanese or English relative-time phrase by
/// subtracting from `reference`. Months approximate to 30 days.
#[must_use]
pub fn parse_relative(text: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(caps) = JA_RELATIVE.captures(text) {
        let amount: i64 = caps[1].parse().ok()?;
        let delta = match &caps[2] {
            "秒" => Duration::seconds(amount),
            "分" => Duration::minutes(amount),
            "時間" => Duration::hours(amount),
            "日" => Duration::days(amount),
            "週間" => Duration::weeks(amount),
            _ => Duration::days(amount * 30),
        };
        return Some(reference - delta);
    }

    if let Some(caps) = EN_RELATIVE.captures(text) {
        let amount: i64 = caps[1].parse().ok()?;
        let delta = match caps[2].to_ascii_lowercase().as_str() {
            "second" => Duration::seconds(amount),
            "minute" => Duration::minutes(amount),
            "hour" => Duration::hours(amount),
            "day" => Duration::days(amount),
            "week" => Duration::weeks(amount),
            _ => Duration::days(amount * 30),
        };
        return Some(reference - delta);
    }

    if text.contains("昨日") || EN_YESTERDAY.is_match(text) {
        return Some(reference - Duration::days(1));
    }
    if text.contains("先週") || EN_LAST_WEEK.is_match(text) {
        return Some(reference - Duration::weeks(1));
    }
    if text.contains("今日") || EN_TODAY.is_match(text) {
        return Some(reference);
    }

    None
}

/// Run the three layers in order over whatever date material the article
/// carries; the first that resolves wins.
#[must_use]
pub fn parse_multi_layer(
    published_at: Option<&str>,
    url: &str,
    meta: Option<&str>,
    reference: DateTime<Utc>,
) -> ParsedDate {
    if let Some(date) = published_at.and_then(parse_explicit) {
        return ParsedDate {
            date: Some(date),
            confidence: DateConfidence::High,
            source: DateSource::PublishedAt,
        };
    }
    if let Some(date) = meta.and_then(parse_explicit) {
        return ParsedDate {
            date: Some(date),
            confidence: DateConfidence::High,
            source: DateSource::PublishedAt,
        };
    }
    if let Some(date) = parse_url_date(url, None) {
        return ParsedDate {
            date: Some(date),
            confidence: DateConfidence::Medium,
            source: DateSource::UrlDate,
        };
    }
    if let Some(date) = meta.and_then(|m| parse_relative(m, reference)) {
        return ParsedDate {
            date: Some(date),
            confidence: DateConfidence::Low,
            source: DateSource::RelativeTime,
        };
    }

    ParsedDate::unresolved()
}

/// Dispatch to a single layer according to the source's configured date
/// method.
#[must_use]
pub fn parse_by_method(
    method: DateMethod,
    url: &str,
    meta: Option<&str>,
    pattern: Option<&str>,
    reference: DateTime<Utc>,
) -> ParsedDate {
    let resolved = match method {
        DateMethod::HtmlMeta | DateMethod::Api => meta.and_then(parse_explicit).map(|date| {
            (date, DateConfidence::High, DateSource::PublishedAt)
        }),
        DateMethod::UrlParse => parse_url_date(url, pattern)
            .map(|date| (date, DateConfidence::Medium, DateSource::UrlDate)),
        DateMethod::HtmlParse | DateMethod::SearchResult => meta
            .and_then(|m| parse_relative(m, reference))
            .map(|date| (date, DateConfidence::Low, DateSource::RelativeTime)),
    };

    match resolved {
        Some((date, confidence, source)) => ParsedDate {
            date: Some(date),
            confidence,
            source,
        },
        None => ParsedDate::unresolved(),
    }
}

/// Start of the freshness window.
///
/// Mondays widen the window to at least 72 hours so weekend articles are
/// caught up, while an earlier `last_success` still wins to avoid gaps;
/// other days pick up exactly where the last successful run left off.
#[must_use]
pub fn window_start(last_success: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now.weekday() == Weekday::Mon {
        let catchup = now - Duration::hours(72);
        match last_success {
            Some(last) => last.min(catchup),
            None => catchup,
        }
    } else {
        last_success.unwrap_or(now - Duration::hours(24))
    }
}

/// Freshness verdict for one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub is_fresh: bool,
    pub priority: FreshnessPriority,
    pub source: DateSource,
    pub resolved: Option<DateTime<Utc>>,
}

/// Classify an article against the freshness window.
///
/// Takes the best estimate in layer order; when no layer resolved,
/// `first_seen` (if supplied) stands in; with nothing at all the article is
/// conservatively treated as fresh at low priority.
#[must_use]
pub fn classify_freshness(
    parsed: &ParsedDate,
    window_start: DateTime<Utc>,
    first_seen: Option<DateTime<Utc>>,
) -> Freshness {
    if let Some(date) = parsed.date {
        let priority = match parsed.source {
            DateSource::PublishedAt => FreshnessPriority::High,
            DateSource::UrlDate | DateSource::RelativeTime => FreshnessPriority::Normal,
            DateSource::FirstSeenAt | DateSource::None => FreshnessPriority::Low,
        };
        return Freshness {
            is_fresh: date >= window_start,
            priority,
            source: parsed.source,
            resolved: Some(date),
        };
    }

    if let Some(seen) = first_seen {
        return Freshness {
            is_fresh: seen >= window_start,
            priority: FreshnessPriority::Low,
            source: DateSource::FirstSeenAt,
            resolved: Some(seen),
        };
    }

    Freshness {
        is_fresh: true,
        priority: FreshnessPriority::Low,
        source: DateSource::None,
        resolved: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    // ------------------------------------------------------------------
    // Layer 1
    // ------------------------------------------------------------------

    #[test]
    fn explicit_parses_rfc3339() {
        assert_eq!(
            parse_explicit("2024-01-15T09:30:00Z"),
            Some(at(2024, 1, 15, 9) + Duration::minutes(30))
        );
    }

    #[test]
    fn explicit_parses_rfc3339_with_offset() {
        assert_eq!(
            parse_explicit("2024-01-15T09:00:00+09:00"),
            Some(at(2024, 1, 15, 0))
        );
    }

    #[test]
    fn explicit_parses_bare_date_as_midnight() {
        assert_eq!(parse_explicit("2024-01-15"), Some(at(2024, 1, 15, 0)));
        assert_eq!(parse_explicit("2024/01/15"), Some(at(2024, 1, 15, 0)));
    }

    #[test]
    fn explicit_parses_japanese_date() {
        assert_eq!(parse_explicit("2024年1月15日"), Some(at(2024, 1, 15, 0)));
    }

    #[test]
    fn explicit_rejects_garbage() {
        assert_eq!(parse_explicit("not a date"), None);
        assert_eq!(parse_explicit(""), None);
    }

    // ------------------------------------------------------------------
    // Layer 2
    // ------------------------------------------------------------------

    #[test]
    fn url_date_from_path() {
        assert_eq!(
            parse_url_date("https://techcrunch.com/2024/01/15/ai", None),
            Some(at(2024, 1, 15, 0))
        );
        assert_eq!(
            parse_url_date("https://example.com/2024-01-15/post", None),
            Some(at(2024, 1, 15, 0))
        );
    }

    #[test]
    fn url_date_from_query_param() {
        assert_eq!(
            parse_url_date("https://example.com/list?date=2024-01-15", None),
            Some(at(2024, 1, 15, 0))
        );
    }

    #[test]
    fn url_date_from_compact_article_path() {
        assert_eq!(
            parse_url_date("https://example.com/article/20240115.html", None),
            Some(at(2024, 1, 15, 0))
        );
        assert_eq!(
            parse_url_date("https://example.com/articles/20240115", None),
            Some(at(2024, 1, 15, 0))
        );
    }

    #[test]
    fn url_date_rejects_invalid_calendar_date() {
        assert_eq!(
            parse_url_date("https://example.com/2024/13/45/post", None),
            None
        );
    }

    #[test]
    fn url_date_override_pattern_replaces_defaults() {
        let pattern = r"id-(\d{4})(\d{2})(\d{2})";
        assert_eq!(
            parse_url_date("https://example.com/id-20240115", Some(pattern)),
            Some(at(2024, 1, 15, 0))
        );
        // The default patterns are not consulted when an override is given.
        assert_eq!(
            parse_url_date("https://example.com/2024/01/15/x", Some(pattern)),
            None
        );
    }

    // ------------------------------------------------------------------
    // Layer 3
    // ------------------------------------------------------------------

    #[test]
    fn relative_japanese_units() {
        let reference = at(2024, 1, 15, 10);
        assert_eq!(
            parse_relative("2日前", reference),
            Some(at(2024, 1, 13, 10))
        );
        assert_eq!(
            parse_relative("3時間前", reference),
            Some(at(2024, 1, 15, 7))
        );
        assert_eq!(
            parse_relative("1週間前", reference),
            Some(at(2024, 1, 8, 10))
        );
        assert_eq!(
            parse_relative("2ヶ月前", reference),
            Some(reference - Duration::days(60))
        );
    }

    #[test]
    fn relative_japanese_words() {
        let reference = at(2024, 1, 15, 10);
        assert_eq!(parse_relative("昨日", reference), Some(at(2024, 1, 14, 10)));
        assert_eq!(parse_relative("今日", reference), Some(reference));
        assert_eq!(parse_relative("先週", reference), Some(at(2024, 1, 8, 10)));
    }

    #[test]
    fn relative_english_units() {
        let reference = at(2024, 1, 15, 10);
        assert_eq!(
            parse_relative("5 hours ago", reference),
            Some(at(2024, 1, 15, 5))
        );
        assert_eq!(
            parse_relative("2 days ago", reference),
            Some(at(2024, 1, 13, 10))
        );
        assert_eq!(
            parse_relative("1 week ago", reference),
            Some(at(2024, 1, 8, 10))
        );
    }

    #[test]
    fn relative_english_words() {
        let reference = at(2024, 1, 15, 10);
        assert_eq!(
            parse_relative("posted yesterday", reference),
            Some(at(2024, 1, 14, 10))
        );
        assert_eq!(parse_relative("Today", reference), Some(reference));
        assert_eq!(
            parse_relative("Last Week", reference),
            Some(at(2024, 1, 8, 10))
        );
    }

    #[test]
    fn relative_rejects_plain_prose() {
        assert_eq!(parse_relative("a great article", at(2024, 1, 15, 10)), None);
    }

    // ------------------------------------------------------------------
    // Multi-layer & method dispatch
    // ------------------------------------------------------------------

    #[test]
    fn multi_layer_prefers_explicit_over_url() {
        let parsed = parse_multi_layer(
            Some("2024-01-10T00:00:00Z"),
            "https://example.com/2024/01/15/x",
            None,
            at(2024, 1, 15, 10),
        );
        assert_eq!(parsed.source, DateSource::PublishedAt);
        assert_eq!(parsed.confidence, DateConfidence::High);
        assert_eq!(parsed.date, Some(at(2024, 1, 10, 0)));
    }

    #[test]
    fn multi_layer_falls_through_to_url_then_relative() {
        let parsed = parse_multi_layer(
            None,
            "https://example.com/2024/01/15/x",
            None,
            at(2024, 1, 15, 10),
        );
        assert_eq!(parsed.source, DateSource::UrlDate);
        assert_eq!(parsed.confidence, DateConfidence::Medium);

        let parsed = parse_multi_layer(
            None,
            "https://example.com/x",
            Some("2日前"),
            at(2024, 1, 15, 10),
        );
        assert_eq!(parsed.source, DateSource::RelativeTime);
        assert_eq!(parsed.confidence, DateConfidence::Low);
    }

    #[test]
    fn multi_layer_exhausted_returns_unresolved_sentinel() {
        let parsed = parse_multi_layer(None, "https://example.com/x", None, at(2024, 1, 15, 10));
        assert_eq!(parsed, ParsedDate::unresolved());
        assert_eq!(parsed.confidence, DateConfidence::Unknown);
        assert_eq!(parsed.source, DateSource::FirstSeenAt);
    }

    #[test]
    fn method_dispatch_html_meta_parses_explicit() {
        let parsed = parse_by_method(
            DateMethod::HtmlMeta,
            "https://example.com/x",
            Some("2024-01-14T08:00:00Z"),
            None,
            at(2024, 1, 15, 10),
        );
        assert_eq!(parsed.source, DateSource::PublishedAt);
        assert_eq!(parsed.date, Some(at(2024, 1, 14, 8)));
    }

    #[test]
    fn method_dispatch_search_result_parses_relative() {
        let parsed = parse_by_method(
            DateMethod::SearchResult,
            "https://example.com/x",
            Some("3 hours ago"),
            None,
            at(2024, 1, 15, 10),
        );
        assert_eq!(parsed.source, DateSource::RelativeTime);
        assert_eq!(parsed.date, Some(at(2024, 1, 15, 7)));
    }

    #[test]
    fn method_dispatch_url_parse_uses_override_pattern() {
        let parsed = parse_by_method(
            DateMethod::UrlParse,
            "https://example.com/entry-20240115",
            None,
            Some(r"entry-(\d{4})(\d{2})(\d{2})"),
            at(2024, 1, 15, 10),
        );
        assert_eq!(parsed.date, Some(at(2024, 1, 15, 0)));
        assert_eq!(parsed.source, DateSource::UrlDate);
    }

    // ------------------------------------------------------------------
    // Freshness window
    // ------------------------------------------------------------------

    #[test]
    fn monday_without_last_success_is_72h_exactly() {
        // 2024-01-15 is a Monday.
        let now = at(2024, 1, 15, 10);
        assert_eq!(window_start(None, now), now - Duration::hours(72));
    }

    #[test]
    fn monday_prefers_earlier_last_success() {
        let now = at(2024, 1, 15, 10);
        let old = at(2024, 1, 10, 0);
        assert_eq!(window_start(Some(old), now), old);
    }

    #[test]
    fn monday_just_past_72h_window_starts_at_last_success() {
        let last = at(2024, 1, 12, 9);
        // Monday, 72 hours and one hour past last success.
        let now = at(2024, 1, 15, 10);
        assert_eq!(window_start(Some(last), now), last);
    }

    #[test]
    fn weekday_uses_last_success_or_24h() {
        // 2024-01-16 is a Tuesday.
        let now = at(2024, 1, 16, 10);
        let last = at(2024, 1, 15, 6);
        assert_eq!(window_start(Some(last), now), last);
        assert_eq!(window_start(None, now), now - Duration::hours(24));
    }

    // ------------------------------------------------------------------
    // Freshness classification
    // ------------------------------------------------------------------

    #[test]
    fn classify_published_at_is_high_priority() {
        let parsed = ParsedDate {
            date: Some(at(2024, 1, 15, 0)),
            confidence: DateConfidence::High,
            source: DateSource::PublishedAt,
        };
        let freshness = classify_freshness(&parsed, at(2024, 1, 14, 0), None);
        assert!(freshness.is_fresh);
        assert_eq!(freshness.priority, FreshnessPriority::High);
    }

    #[test]
    fn classify_stale_date_is_not_fresh() {
        let parsed = ParsedDate {
            date: Some(at(2024, 1, 10, 0)),
            confidence: DateConfidence::Medium,
            source: DateSource::UrlDate,
        };
        let freshness = classify_freshness(&parsed, at(2024, 1, 14, 0), None);
        assert!(!freshness.is_fresh);
        assert_eq!(freshness.priority, FreshnessPriority::Normal);
    }

    #[test]
    fn classify_falls_back_to_first_seen() {
        let parsed = ParsedDate::unresolved();
        let seen = at(2024, 1, 15, 9);
        let freshness = classify_freshness(&parsed, at(2024, 1, 14, 0), Some(seen));
        assert!(freshness.is_fresh);
        assert_eq!(freshness.source, DateSource::FirstSeenAt);
        assert_eq!(freshness.priority, FreshnessPriority::Low);
    }

    #[test]
    fn classify_nothing_at_all_keeps_on_doubt() {
        let freshness =
            classify_freshness(&ParsedDate::unresolved(), at(2024, 1, 14, 0), None);
        assert!(freshness.is_fresh);
        assert_eq!(freshness.priority, FreshnessPriority::Low);
        assert_eq!(freshness.source, DateSource::None);
        assert!(freshness.resolved.is_none());
    }

    #[test]
    fn scenario_relative_phrase_on_monday() {
        // Monday reference with no prior success: window is 72 hours.
        let reference = at(2024, 1, 15, 10);
        let start = window_start(None, reference);
        assert_eq!(start, at(2024, 1, 12, 10));

        let parsed = parse_multi_layer(None, "https://example.com/x", Some("2日前"), reference);
        assert_eq!(parsed.date, Some(at(2024, 1, 13, 10)));
        assert_eq!(parsed.source, DateSource::RelativeTime);
        assert_eq!(parsed.confidence, DateConfidence::Low);

        let freshness = classify_freshness(&parsed, start, None);
        assert!(freshness.is_fresh);
    }
}
