//! Edit-list manifest: an ordered clip sequence stored as JSON.
//!
//! The engine itself never persists anything; this file format exists so
//! command-line tools can hand a clip sequence to the export pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clip::Clip;

/// Current manifest schema version.
pub const EDIT_LIST_VERSION: &str = "1.0";

/// Top-level manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditList {
    /// Schema version.
    pub version: String,

    /// Human-readable name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Clips in timeline order.
    #[serde(default)]
    pub clips: Vec<Clip>,
}

impl EditList {
    /// Create an empty edit list.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: EDIT_LIST_VERSION.to_string(),
            name: name.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            clips: Vec::new(),
        }
    }

    /// Load a manifest from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref().to_path_buf();
        let json = std::fs::read_to_string(&path).map_err(|e| ProjectError::IoError {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError { path, source: e })
    }

    /// Write the manifest, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| ProjectError::IoError { path, source: e })
    }

    /// Structural problems that do not require probing the sources.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        if self.version != EDIT_LIST_VERSION {
            errors.push(format!("Unsupported version: {}", self.version));
        }

        for (index, clip) in self.clips.iter().enumerate() {
            if clip.trim_duration.is_zero() {
                errors.push(format!("Clip {index}: trim duration must be positive"));
            }
            if clip.checked_trim_end().is_none() {
                errors.push(format!("Clip {index}: trim window out of range"));
            }
            if clip.source.as_str().trim().is_empty() {
                errors.push(format!("Clip {index}: empty source locator"));
            }
            if let Some(filter) = &clip.filter {
                if !filter.is_in_range() {
                    let (lo, hi) = filter.range();
                    errors.push(format!(
                        "Clip {index}: {} {} outside [{lo}, {hi}]",
                        filter.name(),
                        filter.value()
                    ));
                }
            }
            if let Some(path) = clip.source.local_path() {
                if !path.exists() {
                    errors.push(format!("Clip {index}: source missing: {}", path.display()));
                }
            }
        }

        errors
    }

    /// Sum of all clip durations, saturating at `Duration::MAX`.
    pub fn total_duration(&self) -> std::time::Duration {
        self.clips
            .iter()
            .fold(std::time::Duration::ZERO, |acc, c| acc.saturating_add(c.trim_duration))
    }
}

/// Errors that can occur when reading or writing manifests.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}
