//! Shared context handed to every callback of one operation

use super::Action;
use crate::config::QuarryConfig;
use crate::document::Document;
use crate::error::Result;
use crate::schema::ModelSpec;
use crate::storage::Storage;
use crate::store::{DocumentStore, QueryParams, StoreOptions};
use std::sync::Arc;

/// Context of one store operation
#[derive(Clone)]
pub struct HookContext {
    pub tenant: String,
    pub action: Action,
    pub spec: Arc<ModelSpec>,
    /// Stored document for update and delete
    pub existing: Option<Document>,
    pub options: StoreOptions,
    store: DocumentStore,
}

impl HookContext {
    pub(crate) fn new(store: DocumentStore, action: Action, existing: Option<Document>, options: StoreOptions) -> Self {
        Self {
            tenant: store.tenant().to_string(),
            action,
            spec: store.spec().clone(),
            existing,
            options,
            store,
        }
    }

    pub fn actor(&self) -> Option<&str> {
        self.options.actor.as_deref()
    }

    pub fn params(&self) -> &QueryParams {
        &self.options.params
    }

    /// Store of the model being operated on
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Store of another model of the same tenant
    pub fn api_for(&self, model: &str) -> Result<DocumentStore> {
        self.store.api_for(model)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.store.storage()
    }

    pub fn config(&self) -> &QuarryConfig {
        self.store.config()
    }

    /// Identity of the document being written, from `doc` or the stored copy
    pub fn identity_in<'a>(&'a self, doc: &'a Document) -> Option<&'a serde_json::Value> {
        self.spec.identity_of(doc).or_else(|| self.existing.as_ref().and_then(|e| self.spec.identity_of(e)))
    }
}

impl std::fmt::Debug for HookContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext")
            .field("tenant", &self.tenant)
            .field("action", &self.action)
            .field("model", &self.spec.name)
            .field("actor", &self.options.actor)
            .finish()
    }
}
