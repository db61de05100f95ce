//! Runtime configuration
//!
//! Read from TOML. Missing keys fall back to defaults; values are range-checked
//! with `validator` before anything is started.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    pub database_path: PathBuf,
    /// Capacity used until the user picks one
    #[validate(range(min = 1, max = 1000))]
    pub default_max_items: u32,
    #[validate(range(min = 10, max = 60000))]
    pub poll_interval_ms: u32,
    /// Upper bound on any single clipboard read or write
    #[validate(range(min = 10, max = 60000))]
    pub clipboard_timeout_ms: u32,
    /// Pending notifications kept per subscriber
    #[validate(range(min = 1, max = 1024))]
    pub notification_capacity: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("copy_stack.db"),
            default_max_items: 100,
            poll_interval_ms: 300,
            clipboard_timeout_ms: 1000,
            notification_capacity: 16,
        }
    }
}

impl HistoryConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: HistoryConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    pub fn clipboard_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.clipboard_timeout_ms))
    }
}
