//! Document store configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Document store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page size when a list does not ask for one
    /// Env: QUARRY_DEFAULT_LIMIT
    /// Default: 100
    pub default_limit: usize,

    /// Upper bound applied to requested page sizes
    /// Env: QUARRY_MAX_LIMIT
    /// Default: 1000
    pub max_limit: usize,

    /// Create the model's derived indexes before every write
    /// Env: QUARRY_ENSURE_INDEXES
    /// Default: true
    pub ensure_indexes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { default_limit: 100, max_limit: 1000, ensure_indexes: true }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_limit == 0 {
            bail!("store.max_limit must be greater than 0");
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            bail!(
                "store.default_limit must be between 1 and max_limit ({}), got {}",
                self.max_limit,
                self.default_limit
            );
        }
        Ok(())
    }

    /// Effective page size for a requested limit
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}
