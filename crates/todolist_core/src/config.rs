//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe where items are stored, how logs are written and where writes
//!   run.
//! - Load settings from JSON (host app) or environment (CLI / tests).
//!
//! # Invariants
//! - Missing fields fall back to `CoreConfig::default()`.
//! - `validate()` must pass before the config is used to open storage.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "TODOLIST_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "TODOLIST_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "TODOLIST_LOG_DIR";
const DEFAULT_DB_FILE_NAME: &str = "todolist.sqlite3";

/// Where fire-and-forget writes execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDispatch {
    /// Dedicated background writer thread.
    #[default]
    Background,
    /// Calling thread; used by tests and the CLI.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    InvalidPath { field: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid core config: {message}"),
            Self::InvalidPath { field, value } => {
                write!(f, "`{field}` must be a non-empty absolute path, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite item database file.
    pub db_path: PathBuf,
    pub log_level: String,
    /// Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub write_dispatch: WriteDispatch,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
            write_dispatch: WriteDispatch::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `TODOLIST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = non_empty_env(DB_PATH_ENV) {
            config.db_path = PathBuf::from(value);
        }
        if let Some(value) = non_empty_env(LOG_LEVEL_ENV) {
            config.log_level = value;
        }
        if let Some(value) = non_empty_env(LOG_DIR_ENV) {
            config.log_dir = Some(PathBuf::from(value));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_absolute("db_path", &self.db_path)?;
        if let Some(log_dir) = &self.log_dir {
            check_absolute("log_dir", log_dir)?;
        }
        Ok(())
    }
}

fn check_absolute(field: &'static str, path: &std::path::Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() || !path.is_absolute() {
        return Err(ConfigError::InvalidPath {
            field,
            value: path.display().to_string(),
        });
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
