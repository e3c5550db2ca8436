//! Built-in feature configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Version snapshot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Suffix of the shadow collection holding snapshots
    /// Env: QUARRY_VERSIONS_SUFFIX
    /// Default: "_versions"
    pub collection_suffix: String,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self { collection_suffix: "_versions".to_string() }
    }
}

impl VersioningConfig {
    pub fn validate(&self) -> Result<()> {
        if self.collection_suffix.is_empty() {
            bail!("versioning.collection_suffix cannot be empty");
        }
        Ok(())
    }

    pub fn collection_for(&self, collection: &str) -> String {
        format!("{}{}", collection, self.collection_suffix)
    }
}

/// Relationship expansion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipsConfig {
    /// Depth selectors are clamped to this value
    /// Env: QUARRY_MAX_DEPTH
    /// Default: 5
    pub max_depth: usize,
}

impl Default for RelationshipsConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

impl RelationshipsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth > 32 {
            bail!("relationships.max_depth must be at most 32, got {}", self.max_depth);
        }
        Ok(())
    }
}

/// Changelog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Env: QUARRY_CHANGELOG_ENABLED
    /// Default: true
    pub enabled: bool,

    /// Env: QUARRY_CHANGELOG_COLLECTION
    /// Default: "changelog"
    pub collection: String,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self { enabled: true, collection: "changelog".to_string() }
    }
}

impl ChangelogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.collection.is_empty() {
            bail!("changelog.collection cannot be empty when the changelog is enabled");
        }
        Ok(())
    }
}

/// Translation fallback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationsConfig {
    /// Env: QUARRY_DEFAULT_LANGUAGE
    /// Default: "en"
    pub default_language: String,
}

impl Default for TranslationsConfig {
    fn default() -> Self {
        Self { default_language: "en".to_string() }
    }
}

impl TranslationsConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
