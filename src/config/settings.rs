//! Engine settings and configuration types.
//!
//! Settings are persisted to `~/.config/mailsift/settings.json` (or XDG
//! equivalent) and loaded at engine startup. The classification rules are
//! part of the same file; they are compiled once during startup, so rule
//! changes take effect on the next load, never mid-run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::RuleConfig;
use crate::providers::ai::DEFAULT_MODEL;

/// Errors from settings persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the settings file failed.
    #[error("settings file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for the expected shape.
    #[error("malformed settings at {path}: {source}")]
    Parse {
        /// File involved.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sync scheduling and batching.
    pub sync: SyncSettings,
    /// Classification model configuration.
    pub model: ModelSettings,
    /// Rule tables for the fallback classifier and spam detection.
    pub rules: RuleConfig,
}

impl Settings {
    /// Loads settings from the default location.
    ///
    /// A missing file is not an error; defaults are returned so a fresh
    /// install starts without any setup.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads settings from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes settings to the default location, creating directories as
    /// needed.
    pub fn save(&self) -> Result<(), ConfigError> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    /// Writes settings to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        // Settings are always serializable; no user data reaches here.
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `~/.config/mailsift/settings.json` or the platform equivalent.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mailsift")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }
}

/// Sync scheduling and batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Whether the background scheduler runs.
    pub enabled: bool,
    /// Scheduler tick interval in seconds. Each tick syncs the accounts
    /// whose own interval has elapsed.
    pub interval_seconds: u32,
    /// Messages fetched concurrently within one batch.
    pub fetch_batch_size: usize,
    /// References requested per provider listing page.
    pub page_size: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
            fetch_batch_size: 10,
            page_size: 100,
        }
    }
}

/// Classification model configuration.
///
/// The model is used when `enabled` is set and the key named by
/// `api_key_env` is present in the environment; otherwise classification
/// falls back to the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Whether model classification is attempted at all.
    pub enabled: bool,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Custom API endpoint for self-hosted or compatible backends.
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}
