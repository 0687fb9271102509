//! URL canonicalization. The normalized form is the primary dedup key, so
//! the transform must be deterministic and idempotent.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;
use url::form_urlencoded;
use url::Url;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Options controlling [`normalize`]. `remove_params` entries ending in `*`
/// match query-parameter names by prefix.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub remove_params: Vec<String>,
    pub strip_trailing_slash: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            remove_params: technews_core::app::DEFAULT_REMOVE_PARAMS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            strip_trailing_slash: true,
        }
    }
}

impl From<&technews_core::UrlNormalization> for NormalizeOptions {
    fn from(cfg: &technews_core::UrlNormalization) -> Self {
        Self {
            remove_params: cfg.remove_params.clone(),
            strip_trailing_slash: cfg.strip_trailing_slash,
        }
    }
}

/// Characters percent-encoded when path segments are re-encoded. `%` is in
/// the set so already-encoded segments survive a decode/re-encode round trip
/// unchanged.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Canonicalize an http(s) URL.
///
/// In order: upgrade to https, lowercase the host and strip `www.`, drop
/// tracking parameters, sort the remaining query, drop the fragment, collapse
/// duplicate slashes, re-encode path segments, and (optionally) strip the
/// trailing slash.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidUrl`] if the input does not parse or is
/// not http(s).
pub fn normalize(url: &str, options: &NormalizeOptions) -> Result<String, NormalizeError> {
    let mut parsed = Url::parse(url.trim()).map_err(|e| NormalizeError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(NormalizeError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| NormalizeError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?
        .to_lowercase();
    let mut host = host.as_str();
    while let Some(rest) = host.strip_prefix("www.") {
        host = rest;
    }
    let host = host.to_string();

    let invalid = |reason: &str| NormalizeError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    parsed
        .set_scheme("https")
        .map_err(|()| invalid("cannot upgrade scheme"))?;
    parsed
        .set_host(Some(&host))
        .map_err(|_| invalid("invalid host"))?;

    let mut retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(name, _)| !should_remove(name, &options.remove_params))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    retained.sort();

    if retained.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &retained {
            serializer.append_pair(name, value);
        }
        parsed.set_query(Some(&serializer.finish()));
    }

    parsed.set_fragment(None);

    let path = normalize_path(parsed.path(), options.strip_trailing_slash);
    parsed.set_path(&path);

    Ok(parsed.to_string())
}

fn should_remove(name: &str, patterns: &[String]) -> bool {
    let name = name.to_ascii_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == pattern,
        }
    })
}

fn normalize_path(path: &str, strip_trailing_slash: bool) -> String {
    let had_trailing = path.ends_with('/');

    let segments: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(reencode_segment)
        .collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(path.len());
    out.push('/');
    out.push_str(&segments.join("/"));
    if had_trailing && !strip_trailing_slash {
        out.push('/');
    }
    out
}

fn reencode_segment(segment: &str) -> String {
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    utf8_percent_encode(&decoded, SEGMENT).to_string()
}

/// Lowercased host with any leading `www.` removed.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidUrl`] if the input does not parse or has
/// no host.
pub fn extract_domain(url: &str) -> Result<String, NormalizeError> {
    let parsed = Url::parse(url.trim()).map_err(|e| NormalizeError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let host = parsed
        .host_str()
        .ok_or_else(|| NormalizeError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?
        .to_lowercase();
    let mut host = host.as_str();
    while let Some(rest) = host.strip_prefix("www.") {
        host = rest;
    }
    Ok(host.to_string())
}

#[must_use]
pub fn is_same_domain(a: &str, b: &str) -> bool {
    match (extract_domain(a), extract_domain(b)) {
        (Ok(da), Ok(db)) => da == db,
        _ => false,
    }
}

#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
