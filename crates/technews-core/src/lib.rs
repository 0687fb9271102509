pub mod app;
pub mod article;
pub mod error;
pub mod queries;
pub mod sources;
pub mod synonyms;
pub mod thresholds;

pub use app::{load_app, AgentSettings, AppFile, HistorySettings, UrlNormalization};
pub use article::{DateConfidence, DateSource, FilteredArticle, FreshnessPriority, RawArticle};
pub use error::ConfigError;
pub use queries::{load_queries, QueriesFile, QueryGroup};
pub use sources::{
    load_sources, save_sources, CollectMethod, DateMethod, EffectiveRate, RateControl,
    SourceConfig, SourcesFile,
};
pub use synonyms::{load_tag_synonyms, TagSynonyms};
pub use thresholds::{load_thresholds, CategoryThresholds, DedupThresholds, Layer2Fallback};
