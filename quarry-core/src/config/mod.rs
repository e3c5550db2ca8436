//! Configuration system for Quarry
//!
//! # Configuration Hierarchy
//!
//! Each layer overlays only the keys it sets on the layers below it:
//!
//! 1. **Environment Variables** (`QUARRY_*`)
//! 2. **Config File** (`QUARRY_CONFIG`, else `quarry.toml`)
//! 3. **Defaults**
//!
//! Layers are applied as TOML tables, so a file setting `store.max_limit`
//! leaves `store.default_limit` at whatever the layer below chose.
//!
//! # Example
//!
//! ```no_run
//! use quarry_core::config::QuarryConfig;
//!
//! let config = QuarryConfig::load()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod features;
pub mod logging;
pub mod models;
pub mod store;

pub use features::{ChangelogConfig, RelationshipsConfig, TranslationsConfig, VersioningConfig};
pub use logging::LoggingConfig;
pub use models::ModelsConfig;
pub use store::StoreConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use toml::{Table, Value};

const DEFAULT_PATH: &str = "quarry.toml";

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    pub store: StoreConfig,
    pub models: ModelsConfig,
    pub versioning: VersioningConfig,
    pub relationships: RelationshipsConfig,
    pub changelog: ChangelogConfig,
    pub translations: TranslationsConfig,
    pub logging: LoggingConfig,
}

impl QuarryConfig {
    /// Defaults, then the file named by `QUARRY_CONFIG` (or `quarry.toml`), then the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("QUARRY_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        Self::load_from(path)
    }

    /// Like [`QuarryConfig::load`] with an explicit file; a missing file is skipped.
    ///
    /// The result is validated.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();
        if path.exists() {
            config.merge(read_table(path)?)?;
        }
        config.apply_env_vars()?;
        config.validate().with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Defaults overlaid with one TOML file, without the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.merge(read_table(path.as_ref())?)?;
        Ok(config)
    }

    /// Overlay a partial table; keys `overlay` does not set keep their current value
    pub fn merge(&mut self, overlay: Table) -> Result<()> {
        let mut table = match Value::try_from(&*self).context("Failed to serialize configuration")? {
            Value::Table(table) => table,
            _ => Table::new(),
        };
        overlay_table(&mut table, overlay);
        *self = Value::Table(table).try_into().context("Invalid configuration value")?;
        Ok(())
    }

    /// Overlay every `QUARRY_*` variable that is set and parses
    pub fn apply_env_vars(&mut self) -> Result<()> {
        let overrides = env_table(|name| std::env::var(name).ok());
        if overrides.is_empty() {
            return Ok(());
        }
        self.merge(overrides)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.models.validate()?;
        self.versioning.validate()?;
        self.relationships.validate()?;
        self.changelog.validate()?;
        self.translations.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn read_table(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse TOML config: {}", path.display()))
}

/// Recursive key-wise overlay; non-table values replace
fn overlay_table(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(inner)), Value::Table(patch)) => overlay_table(inner, patch),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[derive(Clone, Copy)]
enum EnvKind {
    Integer,
    Boolean,
    Text,
    /// Comma-separated
    List,
}

impl EnvKind {
    fn parse(self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            Self::Integer => raw.parse().ok().map(Value::Integer),
            Self::Boolean => raw.parse().ok().map(Value::Boolean),
            Self::Text => Some(Value::String(raw.to_string())),
            Self::List => Some(Value::Array(
                raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(|s| Value::String(s.to_string())).collect(),
            )),
        }
    }
}

/// Environment variable, section, key
const ENV_OVERRIDES: &[(&str, &str, &str, EnvKind)] = &[
    ("QUARRY_DEFAULT_LIMIT", "store", "default_limit", EnvKind::Integer),
    ("QUARRY_MAX_LIMIT", "store", "max_limit", EnvKind::Integer),
    ("QUARRY_ENSURE_INDEXES", "store", "ensure_indexes", EnvKind::Boolean),
    ("QUARRY_DEFAULT_FEATURES", "models", "default_features", EnvKind::List),
    ("QUARRY_IDENTITY_FIELD", "models", "identity_field", EnvKind::Text),
    ("QUARRY_VERSIONS_SUFFIX", "versioning", "collection_suffix", EnvKind::Text),
    ("QUARRY_MAX_DEPTH", "relationships", "max_depth", EnvKind::Integer),
    ("QUARRY_CHANGELOG_ENABLED", "changelog", "enabled", EnvKind::Boolean),
    ("QUARRY_CHANGELOG_COLLECTION", "changelog", "collection", EnvKind::Text),
    ("QUARRY_DEFAULT_LANGUAGE", "translations", "default_language", EnvKind::Text),
    ("QUARRY_LOG_LEVEL", "logging", "level", EnvKind::Text),
    ("QUARRY_LOG_FORMAT", "logging", "format", EnvKind::Text),
];

/// Overlay table built from the variables `lookup` knows; unparsable values are ignored
fn env_table(lookup: impl Fn(&str) -> Option<String>) -> Table {
    let mut table = Table::new();
    for (name, section, key, kind) in ENV_OVERRIDES {
        let Some(value) = lookup(name).and_then(|raw| kind.parse(&raw)) else {
            continue;
        };
        if let Value::Table(inner) =
            table.entry(section.to_string()).or_insert_with(|| Value::Table(Table::new()))
        {
            inner.insert(key.to_string(), value);
        }
    }
    table
}
