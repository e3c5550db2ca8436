//! Logging configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Env: QUARRY_LOG_LEVEL
    /// Default: "info"
    pub level: String,

    /// One of "human", "json", "logfmt"
    /// Env: QUARRY_LOG_FORMAT
    /// Default: "human"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "human".to_string() }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.level.parse::<log::LevelFilter>().is_err() {
            bail!("Invalid log level: {}", self.level);
        }
        if crate::logging::LogFormat::parse(&self.format).is_none() {
            bail!("Invalid log format: {} (expected human, json or logfmt)", self.format);
        }
        Ok(())
    }
}
