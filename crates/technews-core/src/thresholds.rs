use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::ConfigError;

/// Similarity cut-offs for one dedup category.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CategoryThresholds {
    /// Titles with Jaccard similarity at or above this are duplicates.
    pub jaccard_gte: f64,
    /// Titles with normalized edit distance at or below this are duplicates.
    pub levenshtein_lte: f64,
}

/// Jaccard cut-offs for the intra-batch (Layer-2) check, by domain relation.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Layer2Fallback {
    pub same_domain: f64,
    pub cross_domain: f64,
}

impl Default for Layer2Fallback {
    fn default() -> Self {
        Self {
            same_domain: 0.65,
            cross_domain: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupThresholds {
    pub thresholds: HashMap<String, CategoryThresholds>,
    #[serde(default)]
    pub layer2_fallback: HashMap<String, Layer2Fallback>,
}

impl DedupThresholds {
    /// Thresholds for a category, falling back to the `default` entry.
    ///
    /// Validation guarantees the `default` entry exists for loaded files; for
    /// hand-built values without one, permissive cut-offs that never match
    /// are returned.
    #[must_use]
    pub fn for_category(&self, category: &str) -> CategoryThresholds {
        self.thresholds
            .get(category)
            .or_else(|| self.thresholds.get("default"))
            .copied()
            .unwrap_or(CategoryThresholds {
                jaccard_gte: 1.1,
                levenshtein_lte: -1.0,
            })
    }

    /// Layer-2 cut-offs for a source, falling back to the `default` entry,
    /// then to the built-in defaults.
    #[must_use]
    pub fn layer2_for_source(&self, source_id: &str) -> Layer2Fallback {
        self.layer2_fallback
            .get(source_id)
            .or_else(|| self.layer2_fallback.get("default"))
            .copied()
            .unwrap_or_default()
    }
}

/// Load and validate the dedup-threshold configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or lacks the
/// required `default` category.
pub fn load_thresholds(path: &Path) -> Result<DedupThresholds, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: DedupThresholds =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            source: e,
        })?;

    validate_thresholds(&file)?;

    Ok(file)
}

fn validate_thresholds(file: &DedupThresholds) -> Result<(), ConfigError> {
    if !file.thresholds.contains_key("default") {
        return Err(ConfigError::Validation(
            "dedup thresholds must define a 'default' category".to_string(),
        ));
    }

    for (category, t) in &file.thresholds {
        if !(0.0..=1.0).contains(&t.jaccard_gte) {
            return Err(ConfigError::Validation(format!(
                "category '{category}' has jaccard_gte {} outside 0..=1",
                t.jaccard_gte
            )));
        }
        if !(0.0..=1.0).contains(&t.levenshtein_lte) {
            return Err(ConfigError::Validation(format!(
                "category '{category}' has levenshtein_lte {} outside 0..=1",
                t.levenshtein_lte
            )));
        }
    }

    Ok(())
}
