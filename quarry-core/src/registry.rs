//! Model registry
//!
//! The registry is the model-management collaborator: it keeps every
//! tenant's storage handle and model definitions, the catalog of named
//! features, and a cache of composed specs. Definitions can change at
//! runtime; replacing one drops its cached spec so the next call recomposes.
//!
//! ```no_run
//! use quarry_core::config::QuarryConfig;
//! use quarry_core::registry::ModelRegistry;
//! use quarry_core::schema::ModelDefinition;
//! use quarry_core::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! # fn main() -> quarry_core::error::Result<()> {
//! let registry = Arc::new(ModelRegistry::new(QuarryConfig::default()));
//! registry.add_tenant("acme", Arc::new(MemoryStorage::new()))?;
//! registry.define_model("acme", ModelDefinition::new("articles", serde_json::json!({})))?;
//! let articles = registry.api_for("acme", "articles")?;
//! # Ok(())
//! # }
//! ```

use crate::config::QuarryConfig;
use crate::error::{Result, SpecError, StorageError};
use crate::features;
use crate::schema::{compose, Feature, ModelDefinition, ModelSpec, PropertySchema};
use crate::storage::Storage;
use crate::store::DocumentStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolves model specs and storage handles by tenant and model name
pub trait ModelResolver: Send + Sync {
    fn resolve_spec(&self, tenant: &str, model: &str) -> Result<Arc<ModelSpec>>;

    fn storage_for(&self, tenant: &str) -> Result<Arc<dyn Storage>>;

    fn config(&self) -> &QuarryConfig;
}

struct Tenant {
    storage: Arc<dyn Storage>,
    models: HashMap<String, ModelDefinition>,
}

/// In-process [`ModelResolver`] with a composed-spec cache
pub struct ModelRegistry {
    config: QuarryConfig,
    tenants: RwLock<HashMap<String, Tenant>>,
    features: RwLock<HashMap<String, Feature>>,
    specs: RwLock<HashMap<(String, String), Arc<ModelSpec>>>,
}

impl ModelRegistry {
    /// Create a registry with the built-in features registered
    pub fn new(config: QuarryConfig) -> Self {
        let features = features::builtin().into_iter().map(|f| (f.name.clone(), f)).collect();
        Self {
            config,
            tenants: RwLock::new(HashMap::new()),
            features: RwLock::new(features),
            specs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tenant and its storage; replaces any previous registration.
    ///
    /// The storage must assign identifiers under `models.identity_field`.
    pub fn add_tenant(&self, tenant: &str, storage: Arc<dyn Storage>) -> Result<()> {
        let expected = &self.config.models.identity_field;
        if storage.identity_field() != expected {
            return Err(SpecError::IdentityField {
                tenant: tenant.to_string(),
                expected: expected.clone(),
                found: storage.identity_field().to_string(),
            }
            .into());
        }
        self.tenants
            .write()
            .map_err(|_| poisoned())?
            .insert(tenant.to_string(), Tenant { storage, models: HashMap::new() });
        self.invalidate(|(t, _)| t == tenant);
        log::info!("Registered tenant {}", tenant);
        Ok(())
    }

    /// Register or replace a named feature; every cached spec is dropped
    pub fn register_feature(&self, feature: Feature) {
        let name = feature.name.clone();
        if let Ok(mut features) = self.features.write() {
            features.insert(name.clone(), feature);
        }
        self.invalidate(|_| true);
        log::info!("Registered feature {}", name);
    }

    /// Define or replace a model; the definition is composed eagerly so errors surface here
    pub fn define_model(&self, tenant: &str, def: ModelDefinition) -> Result<Arc<ModelSpec>> {
        let spec = Arc::new(self.compose_definition(&def)?);
        let key = (tenant.to_string(), def.name.clone());
        {
            let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
            let entry = tenants.get_mut(tenant).ok_or_else(|| SpecError::UnknownTenant(tenant.to_string()))?;
            entry.models.insert(def.name.clone(), def);
        }
        self.specs.write().map_err(|_| poisoned())?.insert(key, spec.clone());
        Ok(spec)
    }

    /// Remove a model definition; stored documents are left untouched
    pub fn remove_model(&self, tenant: &str, model: &str) -> Result<()> {
        {
            let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
            let entry = tenants.get_mut(tenant).ok_or_else(|| SpecError::UnknownTenant(tenant.to_string()))?;
            entry.models.remove(model).ok_or_else(|| SpecError::UnknownModel(model.to_string()))?;
        }
        self.invalidate(|(t, m)| t == tenant && m == model);
        Ok(())
    }

    /// Model names defined for `tenant`, sorted
    pub fn models(&self, tenant: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .tenants
            .read()
            .ok()
            .and_then(|t| t.get(tenant).map(|t| t.models.keys().cloned().collect()))
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Store handle for a model (the service-locator entry point)
    pub fn api_for(self: &Arc<Self>, tenant: &str, model: &str) -> Result<DocumentStore> {
        DocumentStore::open(self.clone(), tenant, model)
    }

    fn compose_definition(&self, def: &ModelDefinition) -> Result<ModelSpec> {
        let base = match &def.schema {
            serde_json::Value::Null => PropertySchema::empty_object(),
            schema => PropertySchema::parse(schema, "")?,
        };
        let mut names: Vec<String> = Vec::new();
        let implied = features::implied_by(&base);
        let requested = self.config.models.default_features.iter().chain(def.features.iter());
        for name in requested.map(String::as_str).chain(implied) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        let catalog = self.features.read().map_err(|_| poisoned())?;
        let selected = names
            .iter()
            .map(|name| catalog.get(name).ok_or_else(|| SpecError::UnknownFeature(name.clone())))
            .collect::<std::result::Result<Vec<&Feature>, SpecError>>()?;

        Ok(compose(def, &selected, &self.config.models.identity_field)?)
    }

    fn invalidate(&self, matches: impl Fn(&(String, String)) -> bool) {
        if let Ok(mut specs) = self.specs.write() {
            specs.retain(|key, _| !matches(key));
        }
    }
}

impl ModelResolver for ModelRegistry {
    fn resolve_spec(&self, tenant: &str, model: &str) -> Result<Arc<ModelSpec>> {
        let key = (tenant.to_string(), model.to_string());
        if let Some(spec) = self.specs.read().map_err(|_| poisoned())?.get(&key) {
            return Ok(spec.clone());
        }

        let def = {
            let tenants = self.tenants.read().map_err(|_| poisoned())?;
            let entry = tenants.get(tenant).ok_or_else(|| SpecError::UnknownTenant(tenant.to_string()))?;
            entry.models.get(model).cloned().ok_or_else(|| SpecError::UnknownModel(model.to_string()))?
        };
        let spec = Arc::new(self.compose_definition(&def)?);
        self.specs.write().map_err(|_| poisoned())?.insert(key, spec.clone());
        Ok(spec)
    }

    fn storage_for(&self, tenant: &str) -> Result<Arc<dyn Storage>> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        tenants
            .get(tenant)
            .map(|t| t.storage.clone())
            .ok_or_else(|| SpecError::UnknownTenant(tenant.to_string()).into())
    }

    fn config(&self) -> &QuarryConfig {
        &self.config
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("model registry lock poisoned".to_string())
}
