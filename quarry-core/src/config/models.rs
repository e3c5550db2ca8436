//! Model composition configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Features mixed into every model before its own
    /// Env: QUARRY_DEFAULT_FEATURES (comma-separated)
    /// Default: ["audit", "changelog"]
    pub default_features: Vec<String>,

    /// Store-assigned identifier used when no property is flagged `id`;
    /// tenant storage must assign identifiers under the same name
    /// Env: QUARRY_IDENTITY_FIELD
    /// Default: "_id"
    pub identity_field: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_features: vec!["audit".to_string(), "changelog".to_string()],
            identity_field: "_id".to_string(),
        }
    }
}

impl ModelsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.identity_field.is_empty() || self.identity_field.contains('.') {
            bail!("models.identity_field must be a plain field name, got {:?}", self.identity_field);
        }
        Ok(())
    }
}
