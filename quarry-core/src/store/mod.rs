//! Document Store
//!
//! [`DocumentStore`] runs list/get/create/update/delete for one model of one
//! tenant. Every operation drives the model's callback pipeline through its
//! fixed stage order:
//!
//! ```text
//! create/update: beforeValidation -> validate -> afterValidation -> persist -> afterSave
//! delete:        before -> remove -> after
//! list/get:      before (query) -> find -> after (results)
//! ```
//!
//! The store never swallows an error. It only reshapes duplicate-key
//! failures into validation errors of kind `unique`.

pub mod options;

pub use options::{ListResult, QueryParams, Selector, StoreOptions};

use crate::config::QuarryConfig;
use crate::diff::{self, Change};
use crate::document::Document;
use crate::error::{FieldError, QuarryError, Result, StorageError, ValidationErrors, ValidationKind};
use crate::features::audit;
use crate::pipeline::{self, Action, HookContext, Stage};
use crate::registry::ModelResolver;
use crate::schema::{validate_document, ModelSpec};
use crate::storage::{DbStats, Filter, FindOptions, ReadQuery, SortKey, Storage};
use std::sync::Arc;

/// Handle on one model's collection
#[derive(Clone)]
pub struct DocumentStore {
    tenant: String,
    spec: Arc<ModelSpec>,
    storage: Arc<dyn Storage>,
    resolver: Arc<dyn ModelResolver>,
}

impl DocumentStore {
    /// Resolve `model` for `tenant` and open its store
    pub fn open(resolver: Arc<dyn ModelResolver>, tenant: &str, model: &str) -> Result<Self> {
        let spec = resolver.resolve_spec(tenant, model)?;
        let storage = resolver.storage_for(tenant)?;
        Ok(Self { tenant: tenant.to_string(), spec, storage, resolver })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn spec(&self) -> &Arc<ModelSpec> {
        &self.spec
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &QuarryConfig {
        self.resolver.config()
    }

    /// Store of another model of the same tenant
    pub fn api_for(&self, model: &str) -> Result<DocumentStore> {
        Self::open(self.resolver.clone(), &self.tenant, model)
    }

    /// List documents matching `filter`
    pub async fn list(&self, filter: Filter, options: StoreOptions) -> Result<ListResult> {
        let (data, count) = self.read(Action::List, filter, options).await?;
        Ok(ListResult { data, count })
    }

    /// Fetch one document by identity or filter
    pub async fn get(&self, selector: impl Into<Selector>, options: StoreOptions) -> Result<Document> {
        let selector = selector.into();
        let filter = self.selector_filter(&selector);
        let (docs, _) = self.read(Action::Get, filter, options).await?;
        docs.into_iter().next().ok_or_else(|| QuarryError::missing(&self.spec.name, &selector))
    }

    pub async fn create(&self, input: Document, options: StoreOptions) -> Result<Document> {
        self.ensure_indexes().await?;

        let mut doc = input;
        self.spec.strip_unwritable(&mut doc);
        self.apply_defaults(&mut doc);

        let ctx = HookContext::new(self.clone(), Action::Create, None, options);
        let doc = pipeline::invoke(doc, Stage::BeforeValidation, &ctx).await?;
        self.validate(&doc)?;
        let doc = pipeline::invoke(doc, Stage::AfterValidation, &ctx).await?;

        let saved = self.storage.insert(&self.spec.collection, doc).await.map_err(|e| self.reshape(e))?;
        log::debug!("{}: created {}", self.spec.name, self.describe(&saved));

        let saved = pipeline::invoke(saved, Stage::AfterSave, &ctx).await?;
        Ok(self.readable(saved))
    }

    /// Merge `patch` into the stored document, validate and save it.
    ///
    /// Fails with [`QuarryError::Unchanged`] when the merged document does not
    /// differ from the stored one.
    pub async fn update(
        &self,
        selector: impl Into<Selector>,
        patch: Document,
        options: StoreOptions,
    ) -> Result<Document> {
        self.ensure_indexes().await?;

        let selector = selector.into();
        let existing = self.load(&selector, &options).await?;

        let mut patch = patch;
        self.spec.strip_unwritable(&mut patch);
        let mut candidate = existing.clone();
        candidate.merge(&patch);

        if self.spec.identity_of(&candidate) != self.spec.identity_of(&existing) {
            return Err(QuarryError::invalid(
                self.spec.identity.clone(),
                ValidationKind::Immutable,
                "cannot be changed once set",
            ));
        }

        let ctx = HookContext::new(self.clone(), Action::Update, Some(existing.clone()), options);
        let candidate = pipeline::invoke(candidate, Stage::BeforeValidation, &ctx).await?;
        self.validate(&candidate)?;
        let candidate = pipeline::invoke(candidate, Stage::AfterValidation, &ctx).await?;

        if self.changes(&existing, &candidate).is_empty() {
            log::debug!("{}: update of {} is a no-op", self.spec.name, selector);
            return Err(QuarryError::Unchanged);
        }

        let target = self.stored_filter(&existing);
        let replaced = self
            .storage
            .update(&self.spec.collection, &target, candidate.clone())
            .await
            .map_err(|e| self.reshape(e))?;
        if replaced == 0 {
            return Err(QuarryError::missing(&self.spec.name, &selector));
        }
        log::debug!("{}: updated {}", self.spec.name, self.describe(&candidate));

        let saved = pipeline::invoke(candidate, Stage::AfterSave, &ctx).await?;
        Ok(self.readable(saved))
    }

    /// Remove a document; `before` callbacks may veto
    pub async fn delete(&self, selector: impl Into<Selector>, options: StoreOptions) -> Result<Document> {
        self.ensure_indexes().await?;

        let selector = selector.into();
        let existing = self.load(&selector, &options).await?;

        let ctx = HookContext::new(self.clone(), Action::Delete, Some(existing.clone()), options);
        let doc = pipeline::invoke(existing.clone(), Stage::Before, &ctx).await?;

        self.storage
            .remove(&self.spec.collection, &self.stored_filter(&existing))
            .await
            .map_err(|e| self.reshape(e))?;
        log::debug!("{}: deleted {}", self.spec.name, self.describe(&existing));

        let doc = pipeline::invoke(doc, Stage::After, &ctx).await?;
        Ok(self.readable(doc))
    }

    pub async fn count(&self, filter: Filter) -> Result<u64> {
        Ok(self.storage.count(&self.spec.collection, &filter).await?)
    }

    pub async fn db_stats(&self) -> Result<DbStats> {
        Ok(self.storage.stats().await?)
    }

    /// Differences that make an update worth writing
    pub fn changes(&self, existing: &Document, candidate: &Document) -> Vec<Change> {
        diff::diff_documents(existing, candidate, &audit::FIELDS)
    }

    async fn read(&self, action: Action, filter: Filter, options: StoreOptions) -> Result<(Vec<Document>, Option<u64>)> {
        let filter = match &options.scope {
            Some(scope) => scope.clone().and(filter),
            None => filter,
        };
        let params = &options.params;
        let mut sort = params.sort.clone();
        if sort.is_empty() && self.spec.property(audit::CREATED_AT).is_some() {
            sort.push(SortKey::desc(audit::CREATED_AT));
        }
        let find = match action {
            Action::Get => FindOptions { sort, limit: Some(1), skip: 0, projection: None },
            _ => FindOptions {
                sort,
                limit: Some(self.config().store.clamp_limit(params.limit)),
                skip: params.skip.unwrap_or(0),
                projection: None,
            },
        };
        let want_count = action == Action::List && params.count;

        let ctx = HookContext::new(self.clone(), action, None, options);
        let query = pipeline::invoke_query(ReadQuery { filter, options: find }, &ctx).await?;

        let docs = self.storage.find(&self.spec.collection, &query.filter, &query.options).await?;
        let count =
            if want_count { Some(self.storage.count(&self.spec.collection, &query.filter).await?) } else { None };

        let docs = pipeline::invoke_results(docs, &ctx).await?;
        Ok((docs.into_iter().map(|d| self.readable(d)).collect(), count))
    }

    async fn load(&self, selector: &Selector, options: &StoreOptions) -> Result<Document> {
        let filter = self.selector_filter(selector);
        let filter = match &options.scope {
            Some(scope) => scope.clone().and(filter),
            None => filter,
        };
        self.storage
            .find_one(&self.spec.collection, &filter)
            .await?
            .ok_or_else(|| QuarryError::missing(&self.spec.name, selector))
    }

    async fn ensure_indexes(&self) -> Result<()> {
        if !self.config().store.ensure_indexes {
            return Ok(());
        }
        for index in &self.spec.indexes {
            self.storage.create_index(&self.spec.collection, index).await?;
        }
        Ok(())
    }

    fn selector_filter(&self, selector: &Selector) -> Filter {
        match selector {
            Selector::Id(id) => self.spec.identity_filter(id.clone()),
            Selector::Filter(filter) => filter.clone(),
        }
    }

    /// Filter addressing exactly the stored copy of `doc`
    fn stored_filter(&self, doc: &Document) -> Filter {
        let key = &self.config().models.identity_field;
        match doc.get(key) {
            Some(id) => Filter::new().eq(key.clone(), id.clone()),
            None => self.spec.identity_filter(self.spec.identity_of(doc).cloned().unwrap_or_default()),
        }
    }

    fn validate(&self, doc: &Document) -> Result<()> {
        let reserved = [self.config().models.identity_field.as_str()];
        let errors = validate_document(&self.spec.schema, doc, &reserved);
        if errors.is_empty() {
            Ok(())
        } else {
            log::debug!("{}: validation failed: {}", self.spec.name, errors);
            Err(QuarryError::Validation(errors))
        }
    }

    fn apply_defaults(&self, doc: &mut Document) {
        for (name, prop) in &self.spec.schema.properties {
            if let Some(default) = &prop.default {
                if !doc.contains(name) {
                    doc.set(name.clone(), default.clone());
                }
            }
        }
    }

    fn readable(&self, mut doc: Document) -> Document {
        self.spec.strip_unreadable(&mut doc);
        doc
    }

    /// Duplicate keys become field-level `unique` validation errors
    fn reshape(&self, err: StorageError) -> QuarryError {
        match err {
            StorageError::DuplicateKey { index, .. } => {
                let field = self
                    .spec
                    .indexes
                    .iter()
                    .find(|i| i.name == index)
                    .map(|i| i.keys.join(","))
                    .unwrap_or_else(|| index.trim_end_matches("_1").to_string());
                QuarryError::Validation(ValidationErrors::single(FieldError::new(
                    field,
                    ValidationKind::Unique,
                    "must be unique",
                )))
            }
            other => {
                log::error!("{}: storage failure: {}", self.spec.name, other);
                QuarryError::Storage(other)
            }
        }
    }

    fn describe(&self, doc: &Document) -> String {
        self.spec.identity_of(doc).map(crate::document::identity_key).unwrap_or_else(|| "<new>".to_string())
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("tenant", &self.tenant)
            .field("model", &self.spec.name)
            .field("collection", &self.spec.collection)
            .finish()
    }
}
