use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ConfigError;

/// Tracking parameters stripped during URL normalization when the config
/// file does not supply its own list. Entries ending in `*` match by prefix.
pub const DEFAULT_REMOVE_PARAMS: &[&str] = &[
    "utm_*", "ref", "source", "via", "fbclid", "gclid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid",
    "msclkid",
];

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    /// Agent gateway endpoint the fetch executor POSTs to.
    pub endpoint: String,
    #[serde(default = "default_agent_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_agent_timeout_secs() -> u64 {
    180
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlNormalization {
    #[serde(default = "default_remove_params")]
    pub remove_params: Vec<String>,
    #[serde(default = "default_strip_trailing_slash")]
    pub strip_trailing_slash: bool,
}

impl Default for UrlNormalization {
    fn default() -> Self {
        Self {
            remove_params: default_remove_params(),
            strip_trailing_slash: default_strip_trailing_slash(),
        }
    }
}

fn default_remove_params() -> Vec<String> {
    DEFAULT_REMOVE_PARAMS.iter().map(|s| (*s).to_string()).collect()
}

fn default_strip_trailing_slash() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistorySettings {
    pub path: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    90
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppFile {
    pub agent: AgentSettings,
    #[serde(default)]
    pub url_normalization: UrlNormalization,
    pub history: HistorySettings,
    pub output: OutputSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Load the application settings from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_app(path: &Path) -> Result<AppFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: AppFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
        path: path.display().to_string(),
        source: e,
    })?;

    if file.agent.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.endpoint must be non-empty".to_string(),
        ));
    }
    if file.history.retention_days == 0 {
        return Err(ConfigError::Validation(
            "history.retention_days must be at least 1".to_string(),
        ));
    }

    Ok(file)
}
