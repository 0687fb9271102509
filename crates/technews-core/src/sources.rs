use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How a source's articles are obtained.
///
/// Serialized with an internal `collect_method` tag so `sources.yaml` reads
/// naturally: `collect_method: direct_fetch` alongside the variant fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "collect_method", rename_all = "snake_case")]
pub enum CollectMethod {
    /// Fetch a fixed page (top page, feed page) and extract articles from it.
    DirectFetch { url: String },
    /// Run a web/social search. `accounts` marks Twitter-like sources whose
    /// query is assembled from account handles plus keywords.
    Search {
        #[serde(default)]
        query: Option<String>,
        #[serde(default)]
        accounts: Vec<String>,
    },
}

/// Which strategy the date estimator should try first for this source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateMethod {
    HtmlMeta,
    HtmlParse,
    UrlParse,
    SearchResult,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub tier: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub method: CollectMethod,
    #[serde(default)]
    pub date_method: Option<DateMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_pattern: Option<String>,
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    /// Opt-in for the one-shot strict-JSON repair fetch on parse failure.
    #[serde(default)]
    pub repair_json: bool,
}

impl SourceConfig {
    /// Twitter-like sources search by account handles rather than a query.
    #[must_use]
    pub fn is_account_search(&self) -> bool {
        matches!(&self.method, CollectMethod::Search { accounts, .. } if !accounts.is_empty())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_articles() -> usize {
    10
}

/// Per-source overrides for the global rate-control defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRateOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateControl {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_retry_interval_secs")]
    pub default_retry_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_source: HashMap<String, SourceRateOverride>,
}

impl Default for RateControl {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_timeout_secs: default_timeout_secs(),
            default_retry_interval_secs: default_retry_interval_secs(),
            default_max_retries: default_max_retries(),
            per_source: HashMap::new(),
        }
    }
}

fn default_max_concurrency() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_interval_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    1
}

/// The rate parameters in effect for one source after overrides are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRate {
    pub timeout_secs: u64,
    pub retry_interval_secs: u64,
    pub max_retries: u32,
}

impl RateControl {
    /// Resolve the effective rate parameters for `source_id`, falling back to
    /// the global defaults field by field.
    #[must_use]
    pub fn for_source(&self, source_id: &str) -> EffectiveRate {
        let ov = self.per_source.get(source_id);
        EffectiveRate {
            timeout_secs: ov
                .and_then(|o| o.timeout_secs)
                .unwrap_or(self.default_timeout_secs),
            retry_interval_secs: ov
                .and_then(|o| o.retry_interval_secs)
                .unwrap_or(self.default_retry_interval_secs),
            max_retries: ov
                .and_then(|o| o.max_retries)
                .unwrap_or(self.default_max_retries),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub rate_control: RateControl,
}

impl SourcesFile {
    /// Sources that are enabled, in file order.
    #[must_use]
    pub fn enabled(&self) -> Vec<&SourceConfig> {
        self.sources.iter().filter(|s| s.enabled).collect()
    }
}

/// Load and validate the sources configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sources(path: &Path) -> Result<SourcesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: SourcesFile =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            source: e,
        })?;

    validate_sources(&file)?;

    Ok(file)
}

/// Write the sources configuration back to disk.
///
/// Used by the auto-disable pass to persist `enabled: false` for
/// abort-heavy sources between the two collection phases.
///
/// # Errors
///
/// Returns `ConfigError` if serialization or the write fails.
pub fn save_sources(path: &Path, file: &SourcesFile) -> Result<(), ConfigError> {
    let content = serde_yaml::to_string(file).map_err(|e| ConfigError::FileSerialize {
        path: path.display().to_string(),
        source: e,
    })?;
    std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
        path: path.display().to_string(),
        source: e,
    })
}

fn validate_sources(file: &SourcesFile) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();

    for source in &file.sources {
        if source.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source id must be non-empty".to_string(),
            ));
        }

        if ![1, 2, 3].contains(&source.tier) {
            return Err(ConfigError::Validation(format!(
                "source '{}' has invalid tier {}; must be 1, 2, or 3",
                source.id, source.tier
            )));
        }

        if !seen_ids.insert(source.id.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source id: '{}'",
                source.id
            )));
        }

        match &source.method {
            CollectMethod::DirectFetch { url } => {
                if url.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "direct_fetch source '{}' must set url",
                        source.id
                    )));
                }
            }
            CollectMethod::Search { query, accounts } => {
                let has_query = query.as_deref().is_some_and(|q| !q.trim().is_empty());
                if !has_query && accounts.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "search source '{}' must set query or accounts",
                        source.id
                    )));
                }
            }
        }

        if source.max_articles == 0 {
            return Err(ConfigError::Validation(format!(
                "source '{}' has max_articles 0",
                source.id
            )));
        }
    }

    if file.rate_control.max_concurrency == 0 {
        return Err(ConfigError::Validation(
            "rate_control.max_concurrency must be at least 1".to_string(),
        ));
    }

    Ok(())
}
