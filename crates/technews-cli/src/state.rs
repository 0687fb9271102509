//! The `last_success.json` run-state file.
//!
//! Read at startup to anchor the freshness window, written only after a run
//! completes successfully. A missing or unreadable file means "first run".

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct LastSuccess {
    #[serde(rename = "lastSuccessAt")]
    last_success_at: DateTime<Utc>,
}

/// Load the last successful run timestamp, tolerating absence and damage.
#[must_use]
pub fn load_last_success(path: &Path) -> Option<DateTime<Utc>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return None,
    };
    match serde_json::from_str::<LastSuccess>(&content) {
        Ok(state) => Some(state.last_success_at),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable run-state file");
            None
        }
    }
}

/// Persist the last successful run timestamp.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written.
pub fn save_last_success(path: &Path, at: DateTime<Utc>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let state = LastSuccess {
        last_success_at: at,
    };
    let content = serde_json::to_string_pretty(&state)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
