//! Audit configuration
//!
//! Defaults, overlaid by an optional JSON file, overlaid by environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::db::DB_PATH_ENV;
use crate::utils::env::{get_optional, get_optional_secs, CONFIG_PATH_ENV, SECTION_TIMEOUT_ENV};
use crate::utils::validation::validate_service_name;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub db_path: PathBuf,
    pub api_services: Vec<String>,
    pub section_timeout_secs: u64,
    pub log_level: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("gaudit.db"),
            api_services: ["admin_sdk", "drive_api", "gmail_api", "groups_settings_api"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            section_timeout_secs: 300,
            log_level: "info".to_string(),
        }
    }
}

impl AuditConfig {
    /// Path of the config file: `GAUDIT_CONFIG`, else `config.json`
    pub fn config_path() -> PathBuf {
        get_optional(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load from the configured path with environment overrides applied
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(db_path) = get_optional(DB_PATH_ENV) {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(secs) =
            get_optional_secs(SECTION_TIMEOUT_ENV).map_err(|e| ConfigError::Invalid(e.to_string()))?
        {
            self.section_timeout_secs = secs;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.section_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "section_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.api_services.is_empty() {
            return Err(ConfigError::Invalid("api_services must not be empty".to_string()));
        }
        for service in &self.api_services {
            validate_service_name(service).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn section_timeout(&self) -> Duration {
        Duration::from_secs(self.section_timeout_secs)
    }

    /// Write the defaults to `path` unless a file is already there
    ///
    /// Returns whether a new file was created.
    pub fn ensure_config_exists(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }

        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let body = serde_json::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, body).map_err(write_err)?;
        tracing::info!(path = %path.display(), "wrote default config");
        Ok(true)
    }
}
