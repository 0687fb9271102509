use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryGroup {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    /// Base weight before recency/frequency scaling.
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedQueries {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
}

impl Default for CombinedQueries {
    fn default() -> Self {
        Self {
            enabled: false,
            max_combinations: default_max_combinations(),
        }
    }
}

fn default_max_combinations() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRestriction {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_within_days")]
    pub within_days: u32,
}

impl Default for DateRestriction {
    fn default() -> Self {
        Self {
            enabled: false,
            within_days: default_within_days(),
        }
    }
}

fn default_within_days() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySelection {
    pub top_n: usize,
    pub max_per_source: usize,
}

/// A linear band that a 0..=1 ratio is mapped into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringBand {
    pub min: f64,
    pub max: f64,
}

impl ScoringBand {
    /// Map `ratio` (clamped to 0..=1) linearly into `[min, max]`.
    #[must_use]
    pub fn apply(&self, ratio: f64) -> f64 {
        let r = ratio.clamp(0.0, 1.0);
        self.min + r * (self.max - self.min)
    }
}

fn default_recency_band() -> ScoringBand {
    ScoringBand { min: 0.5, max: 1.5 }
}

fn default_frequency_band() -> ScoringBand {
    ScoringBand { min: 0.8, max: 1.2 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueriesFile {
    pub query_groups: Vec<QueryGroup>,
    #[serde(default)]
    pub combined_queries: CombinedQueries,
    #[serde(default)]
    pub date_restriction: DateRestriction,
    pub selection: QuerySelection,
    #[serde(default = "default_recency_band")]
    pub recency_band: ScoringBand,
    #[serde(default = "default_frequency_band")]
    pub frequency_band: ScoringBand,
}

/// Load and validate the query-group configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_queries(path: &Path) -> Result<QueriesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: QueriesFile =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            source: e,
        })?;

    validate_queries(&file)?;

    Ok(file)
}

fn validate_queries(file: &QueriesFile) -> Result<(), ConfigError> {
    if file.query_groups.is_empty() {
        return Err(ConfigError::Validation(
            "query_groups must not be empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for group in &file.query_groups {
        if group.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "query group id must be non-empty".to_string(),
            ));
        }
        if !seen_ids.insert(group.id.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate query group id: '{}'",
                group.id
            )));
        }
        if group.keywords.is_empty() {
            return Err(ConfigError::Validation(format!(
                "query group '{}' has no keywords",
                group.id
            )));
        }
        if group.weight <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "query group '{}' has non-positive weight {}",
                group.id, group.weight
            )));
        }
    }

    if file.selection.top_n == 0 {
        return Err(ConfigError::Validation(
            "selection.top_n must be at least 1".to_string(),
        ));
    }
    if file.selection.max_per_source == 0 {
        return Err(ConfigError::Validation(
            "selection.max_per_source must be at least 1".to_string(),
        ));
    }

    Ok(())
}
