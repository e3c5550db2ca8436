//! Relationship engine
//!
//! Callbacks keeping two-way relationships consistent:
//!
//! | callback                  | stage                 | role                                        |
//! |---------------------------|-----------------------|---------------------------------------------|
//! | `validateRelationshipIds` | save afterValidation  | referenced ids exist, removals allowed      |
//! | `updateAllRelationships`  | save afterSave        | mirror added/removed/changed references     |
//! | `checkCanDelete`          | delete before (first) | veto when required dependents remain        |
//! | `deleteAllRelationships`  | delete before         | detach or cascade every reference           |
//! | `expandRelationships`     | read after            | splice related documents into results       |
//!
//! Reciprocal writes run with this feature skipped so propagation never
//! re-enters itself. They are issued one by one in declaration order and
//! are not rolled back when a later write fails.

mod expand;
mod selector;

pub use selector::{GraphSelector, RelationshipSelector};

use crate::document::{identity_key, Document};
use crate::error::{FieldError, QuarryError, Result, SpecError, ValidationErrors, ValidationKind};
use crate::pipeline::{ActionFamily, Callback, HookContext, Priority, RegisteredCallback, Stage};
use crate::schema::{mirror_entry, reference_id, references, Feature, OnDelete, Reference, ReferenceDiff, Relationship};
use crate::storage::{Filter, FindOptions};
use crate::store::{DocumentStore, StoreOptions};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub const NAME: &str = "relationships";

pub fn feature() -> Feature {
    Feature::new(NAME)
        .with_callback(RegisteredCallback::new(
            "validateRelationshipIds",
            ActionFamily::Save,
            Stage::AfterValidation,
            Arc::new(ValidateIds),
        ))
        .with_callback(RegisteredCallback::new(
            "updateAllRelationships",
            ActionFamily::Save,
            Stage::AfterSave,
            Arc::new(UpdateAll),
        ))
        .with_callback(
            RegisteredCallback::new("checkCanDelete", ActionFamily::Delete, Stage::Before, Arc::new(CheckCanDelete))
                .with_priority(Priority::First),
        )
        .with_callback(RegisteredCallback::new(
            "deleteAllRelationships",
            ActionFamily::Delete,
            Stage::Before,
            Arc::new(DeleteAll),
        ))
        .with_callback(RegisteredCallback::new(
            "expandRelationships",
            ActionFamily::Read,
            Stage::After,
            Arc::new(expand::Expand),
        ))
}

/// A two-way relationship seen from its source property
struct Link {
    property: String,
    relationship: Relationship,
    source_model: String,
    target: DocumentStore,
    /// Reciprocal property on the target model
    field: String,
    /// The reciprocal holds an array of references
    many: bool,
    required: bool,
    cascade: bool,
}

impl Link {
    fn resolve(store: &DocumentStore, property: &str, relationship: &Relationship) -> Result<Option<Self>> {
        let Some(field) = &relationship.to_field else {
            return Ok(None);
        };
        let target = store.api_for(&relationship.to_type)?;
        let reciprocal = target.spec().property(field).ok_or_else(|| SpecError::InvalidSchema {
            path: format!("{}.{}", relationship.to_type, field),
            reason: format!("reciprocal of {}.{} is not declared", store.spec().name, property),
        })?;
        let reciprocal_rel = reciprocal.meta.relationship.as_ref();

        Ok(Some(Self {
            property: property.to_string(),
            relationship: relationship.clone(),
            source_model: store.spec().name.clone(),
            many: reciprocal_rel.is_some_and(|r| r.cardinality.is_to_many()) || reciprocal.is_array_only(),
            required: target.spec().schema.is_required(field),
            cascade: relationship.on_delete == OnDelete::Cascade
                || reciprocal_rel.is_some_and(|r| r.on_delete == OnDelete::Cascade),
            field: field.clone(),
            target,
        }))
    }

    /// A singular, required reciprocal: its owner cannot simply let go
    fn is_dependent(&self) -> bool {
        !self.many && self.required
    }

    async fn load(&self, id: &Value) -> Result<Option<Document>> {
        let spec = self.target.spec();
        Ok(self.target.storage().find_one(&spec.collection, &spec.identity_filter(id.clone())).await?)
    }

    /// Target documents among `refs` whose reciprocal points back at `source_id`
    async fn dependents(&self, source_id: &Value, refs: &[Reference]) -> Result<Vec<Document>> {
        let spec = self.target.spec();
        let ids = refs.iter().map(|r| r.id.clone()).collect();
        let found = self
            .target
            .storage()
            .find(&spec.collection, &Filter::new().is_in(spec.identity.clone(), ids), &FindOptions::default())
            .await?;
        let source = identity_key(source_id);
        Ok(found.into_iter().filter(|doc| points_at(doc.get(&self.field), &source)).collect())
    }

    async fn write(&self, options: &StoreOptions, id: &Value, value: Value) -> Result<()> {
        let mut patch = Document::new();
        patch.set(self.field.clone(), value);
        let options = options.derived().skipping(NAME);
        match self.target.update(id.clone(), patch, options).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_unchanged() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn attach(&self, ctx: &HookContext, source_id: &Value, reference: &Reference) -> Result<()> {
        let Some(target) = self.load(&reference.id).await? else {
            log::warn!("{}: cannot mirror {} onto missing {}", self.source_model, self.property, reference.key());
            return Ok(());
        };
        let entry = mirror_entry(&reference.entry, source_id, &self.source_model);
        let source = identity_key(source_id);

        if self.many {
            let mut items = entries(target.get(&self.field));
            if items.iter().any(|e| entry_key(e).as_deref() == Some(source.as_str())) {
                return Ok(());
            }
            items.push(entry);
            return self.write(&ctx.options, &reference.id, Value::Array(items)).await;
        }

        if let Some(owner) = target.get(&self.field).and_then(reference_id) {
            if identity_key(&owner) != source {
                self.release(ctx, &owner, &reference.id).await?;
            }
        }
        self.write(&ctx.options, &reference.id, entry).await
    }

    /// Drop `target_id` from a previous owner before its singular reciprocal moves
    async fn release(&self, ctx: &HookContext, owner: &Value, target_id: &Value) -> Result<()> {
        let store = ctx.store();
        let spec = store.spec();
        let Some(previous) = store.storage().find_one(&spec.collection, &spec.identity_filter(owner.clone())).await?
        else {
            return Ok(());
        };
        let released = identity_key(target_id);
        let value = match previous.get(&self.property) {
            Some(Value::Array(items)) => Value::Array(
                items.iter().filter(|e| entry_key(e).as_deref() != Some(released.as_str())).cloned().collect(),
            ),
            _ => Value::Null,
        };

        let mut patch = Document::new();
        patch.set(self.property.clone(), value);
        log::debug!("{}: releasing {} from {}", self.source_model, released, identity_key(owner));
        match store.update(owner.clone(), patch, ctx.options.derived().skipping(NAME)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_unchanged() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn detach(&self, options: &StoreOptions, source_id: &Value, reference: &Reference) -> Result<()> {
        let Some(target) = self.load(&reference.id).await? else {
            return Ok(());
        };
        let source = identity_key(source_id);

        if self.many {
            let items = entries(target.get(&self.field));
            let kept: Vec<Value> =
                items.iter().filter(|e| entry_key(e).as_deref() != Some(source.as_str())).cloned().collect();
            if kept.len() == items.len() {
                return Ok(());
            }
            return self.write(options, &reference.id, Value::Array(kept)).await;
        }

        if !points_at(target.get(&self.field), &source) {
            return Ok(());
        }
        if !self.required {
            return self.write(options, &reference.id, Value::Null).await;
        }
        if !self.cascade {
            return Err(self.blocked(&[reference.key()]));
        }

        log::info!("{}: cascading delete to {} {}", self.source_model, self.relationship.to_type, reference.key());
        match self.target.delete(reference.id.clone(), options.derived()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_missing() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn rewrite(&self, options: &StoreOptions, source_id: &Value, reference: &Reference) -> Result<()> {
        let Some(target) = self.load(&reference.id).await? else {
            return Ok(());
        };
        let entry = mirror_entry(&reference.entry, source_id, &self.source_model);
        let source = identity_key(source_id);

        if self.many {
            let items = entries(target.get(&self.field))
                .into_iter()
                .map(|e| if entry_key(&e).as_deref() == Some(source.as_str()) { entry.clone() } else { e })
                .collect();
            self.write(options, &reference.id, Value::Array(items)).await
        } else if points_at(target.get(&self.field), &source) {
            self.write(options, &reference.id, entry).await
        } else {
            Ok(())
        }
    }

    fn blocked(&self, ids: &[String]) -> QuarryError {
        QuarryError::Validation(ValidationErrors::single(self.blocked_error(ids)))
    }

    fn blocked_error(&self, ids: &[String]) -> FieldError {
        FieldError::new(
            self.property.clone(),
            ValidationKind::Cascade,
            format!("{} {} require this {}", self.relationship.to_type, ids.join(", "), self.source_model),
        )
    }
}

fn entries(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(single) => vec![single.clone()],
    }
}

fn entry_key(entry: &Value) -> Option<String> {
    reference_id(entry).map(|id| identity_key(&id))
}

fn points_at(value: Option<&Value>, source: &str) -> bool {
    references(value).iter().any(|r| r.key() == source)
}

struct ValidateIds;

impl ValidateIds {
    async fn missing_ids(ctx: &HookContext, relationship: &Relationship, refs: &[Reference]) -> Result<Vec<String>> {
        let target = ctx.api_for(&relationship.to_type)?;
        let spec = target.spec();

        let mut seen = HashSet::new();
        let ids: Vec<Value> = refs.iter().filter(|r| seen.insert(r.key())).map(|r| r.id.clone()).collect();
        let options = FindOptions { projection: Some(vec![spec.identity.clone()]), ..FindOptions::default() };
        let found: HashSet<String> = target
            .storage()
            .find(&spec.collection, &Filter::new().is_in(spec.identity.clone(), ids.clone()), &options)
            .await?
            .iter()
            .filter_map(|doc| spec.identity_of(doc).map(identity_key))
            .collect();

        Ok(ids.iter().map(identity_key).filter(|key| !found.contains(key)).collect())
    }
}

#[async_trait]
impl Callback for ValidateIds {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let mut errors = Vec::new();

        for (property, _, relationship) in ctx.spec.relationships() {
            let refs = references(doc.get(property));
            if !refs.is_empty() {
                let missing = Self::missing_ids(ctx, relationship, &refs).await?;
                if !missing.is_empty() {
                    errors.push(FieldError::new(
                        property,
                        ValidationKind::Relationship,
                        format!("references missing {}: {}", relationship.to_type, missing.join(", ")),
                    ));
                }
            }

            let Some(existing) = &ctx.existing else { continue };
            let removed = ReferenceDiff::between(existing.get(property), doc.get(property)).removed;
            if removed.is_empty() {
                continue;
            }
            let Some(link) = Link::resolve(ctx.store(), property, relationship)? else { continue };
            if link.is_dependent() && !link.cascade {
                let Some(source_id) = ctx.identity_in(&doc) else { continue };
                let blocking = link.dependents(source_id, &removed).await?;
                if !blocking.is_empty() {
                    let ids: Vec<String> =
                        blocking.iter().filter_map(|d| link.target.spec().identity_of(d)).map(identity_key).collect();
                    errors.push(link.blocked_error(&ids));
                }
            }
        }

        if errors.is_empty() {
            Ok(None)
        } else {
            Err(QuarryError::Validation(ValidationErrors(errors)))
        }
    }
}

struct UpdateAll;

#[async_trait]
impl Callback for UpdateAll {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let Some(source_id) = ctx.identity_in(&doc).cloned() else {
            return Ok(None);
        };
        let existing = ctx.existing.as_ref();

        for (property, _, relationship) in ctx.spec.relationships() {
            if !relationship.is_two_way() {
                continue;
            }
            let diff = ReferenceDiff::between(existing.and_then(|e| e.get(property)), doc.get(property));
            if diff.is_empty() {
                continue;
            }
            let Some(link) = Link::resolve(ctx.store(), property, relationship)? else { continue };
            log::debug!(
                "{}: mirroring {} (+{} -{} ~{})",
                ctx.spec.name,
                property,
                diff.added.len(),
                diff.removed.len(),
                diff.changed.len()
            );

            for reference in &diff.removed {
                link.detach(&ctx.options, &source_id, reference).await?;
            }
            for reference in &diff.added {
                link.attach(ctx, &source_id, reference).await?;
            }
            for reference in &diff.changed {
                link.rewrite(&ctx.options, &source_id, reference).await?;
            }
        }
        Ok(None)
    }
}

struct CheckCanDelete;

/// Cascade blockers for deleting `doc`, following cascades recursively
fn blockers(
    store: DocumentStore,
    doc: Document,
    visited: &mut HashSet<(String, String)>,
) -> BoxFuture<'_, Result<Vec<FieldError>>> {
    async move {
        let Some(id) = store.spec().identity_of(&doc).cloned() else {
            return Ok(Vec::new());
        };
        if !visited.insert((store.spec().name.clone(), identity_key(&id))) {
            return Ok(Vec::new());
        }

        let mut errors = Vec::new();
        for (property, _, relationship) in store.spec().relationships() {
            let refs = references(doc.get(property));
            if refs.is_empty() {
                continue;
            }
            let Some(link) = Link::resolve(&store, property, relationship)? else { continue };
            if !link.is_dependent() {
                continue;
            }

            let dependents = link.dependents(&id, &refs).await?;
            if link.cascade {
                for dependent in dependents {
                    errors.extend(blockers(link.target.clone(), dependent, visited).await?);
                }
            } else if !dependents.is_empty() {
                let ids: Vec<String> =
                    dependents.iter().filter_map(|d| link.target.spec().identity_of(d)).map(identity_key).collect();
                errors.push(link.blocked_error(&ids));
            }
        }
        Ok(errors)
    }
    .boxed()
}

#[async_trait]
impl Callback for CheckCanDelete {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let mut visited = HashSet::new();
        let errors = blockers(ctx.store().clone(), doc, &mut visited).await?;
        if errors.is_empty() {
            Ok(None)
        } else {
            log::debug!("{}: delete vetoed by {} relationship(s)", ctx.spec.name, errors.len());
            Err(QuarryError::Validation(ValidationErrors(errors)))
        }
    }
}

struct DeleteAll;

#[async_trait]
impl Callback for DeleteAll {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let Some(source_id) = ctx.identity_in(&doc).cloned() else {
            return Ok(None);
        };
        for (property, _, relationship) in ctx.spec.relationships() {
            let refs = references(doc.get(property));
            if refs.is_empty() {
                continue;
            }
            let Some(link) = Link::resolve(ctx.store(), property, relationship)? else { continue };
            for reference in &refs {
                link.detach(&ctx.options, &source_id, reference).await?;
            }
        }
        Ok(None)
    }
}
