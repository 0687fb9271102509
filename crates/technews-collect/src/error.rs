use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Substrings that mark an abort-style failure. A source whose retried
/// attempts keep hitting these is wasting the run's budget and becomes a
/// candidate for auto-disable.
pub const ABORT_MARKERS: &[&str] = &["aborted by user", "process aborted", "operation aborted"];

/// Coarse failure taxonomy, recovered from raw error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Network,
    RateLimit,
    Parse,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::RateLimit => write!(f, "rate_limit"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify raw error text by lowercase substring, first match wins.
#[must_use]
pub fn classify(message: &str) -> ErrorKind {
    let m = message.to_lowercase();
    if m.contains("timeout") || m.contains("abort") {
        ErrorKind::Timeout
    } else if m.contains("network") || m.contains("fetch") || m.contains("connect") {
        ErrorKind::Network
    } else if m.contains("rate") || m.contains("limit") || m.contains("429") {
        ErrorKind::RateLimit
    } else if m.contains("parse") || m.contains("json") {
        ErrorKind::Parse
    } else {
        ErrorKind::Unknown
    }
}

/// A classified per-source failure, carrying the retry budget actually
/// spent so the auto-disable pass can inspect it.
#[derive(Debug, Clone, Error)]
#[error("source '{source_id}' failed ({kind}) after {retry_count} retries: {message}")]
pub struct SourceError {
    pub kind: ErrorKind,
    pub source_id: String,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl SourceError {
    #[must_use]
    pub fn new(source_id: &str, retry_count: u32, message: String) -> Self {
        Self {
            kind: classify(&message),
            source_id: source_id.to_string(),
            retry_count,
            timestamp: Utc::now(),
            message,
        }
    }

    /// True if the message carries one of the abort markers.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        let m = self.message.to_lowercase();
        ABORT_MARKERS.iter().any(|marker| m.contains(marker))
    }

    /// Abort-heavy: retried at least once and still aborted. These sources
    /// are candidates for auto-disable.
    #[must_use]
    pub fn is_abort_heavy(&self) -> bool {
        self.retry_count >= 1 && self.is_abort()
    }
}
