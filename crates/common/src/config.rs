//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where previews and final exports are written.
    pub output: OutputConfig,

    /// External media tools.
    pub tools: ToolsConfig,

    /// Export job policy.
    pub export: ExportSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Output directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Scratch directory for session previews.
    pub preview_dir: PathBuf,

    /// Directory for finalized exports.
    pub export_dir: PathBuf,
}

/// Paths (or names on `PATH`) of the ffmpeg tool pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

/// Export job policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Automatic retries after an encoder failure.
    pub encoder_retries: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "montage=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            tools: ToolsConfig::default(),
            export: ExportSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            preview_dir: xdg_dir("XDG_CACHE_HOME", ".cache")
                .join("montage")
                .join("previews"),
            export_dir: xdg_dir("XDG_DATA_HOME", ".local/share")
                .join("montage")
                .join("exports"),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self { encoder_retries: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.tools.ffmpeg.trim().is_empty() || self.tools.ffprobe.trim().is_empty() {
            return Err(EngineError::config("tools.ffmpeg and tools.ffprobe must be set"));
        }
        if self.export.encoder_retries > 5 {
            return Err(EngineError::config(format!(
                "export.encoder_retries = {} (max 5)",
                self.export.encoder_retries
            )));
        }
        Ok(())
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
        .join("montage")
        .join("config.json")
}

fn xdg_dir(var: &str, home_fallback: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(home_fallback)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.export.encoder_retries, 1);
    }

    #[test]
    fn test_rejects_empty_tool_path() {
        let mut config = AppConfig::default();
        config.tools.ffprobe = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip_keeps_dirs() {
        let mut config = AppConfig::default();
        config.output.preview_dir = PathBuf::from("/tmp/montage-previews");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.output.preview_dir, PathBuf::from("/tmp/montage-previews"));
        assert_eq!(parsed.tools.ffmpeg, "ffmpeg");
    }
}
