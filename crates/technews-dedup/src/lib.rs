//! The deduplication engine: URL canonicalization, mixed-language title
//! similarity, multi-strategy date estimation, and the staged pipeline that
//! ties them to the history store.

pub mod dates;
pub mod pipeline;
pub mod similarity;
pub mod urlnorm;

pub use dates::{classify_freshness, window_start, Freshness, ParsedDate};
pub use pipeline::{DedupError, DedupOutcome, DedupStats, Deduplicator, SourceDateHints};
pub use urlnorm::{
    extract_domain, is_same_domain, is_valid_url, normalize, NormalizeError, NormalizeOptions,
};
