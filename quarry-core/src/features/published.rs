//! Versioning and publishing state machine
//!
//! Documents move between four states:
//!
//! ```text
//! unversioned      no `version`
//! draft            `publishedVersion` unset
//! published        `publishedVersion == version`
//! published-stale  `publishedVersion < version` (a newer draft sits on top)
//! ```
//!
//! A save cuts a new version only when a versioned property changes on a
//! document already published at its current version; every other save
//! edits the current draft in place. Snapshots of the versioned properties
//! live in the `<collection>_versions` shadow collection, keyed by
//! `(documentId, version)` and `(documentId, versionToken)`, once the
//! document carries a version token.

use crate::document::{identity_key, Document};
use crate::error::Result;
use crate::features::audit::{CREATED_AT, CREATED_BY};
use crate::pipeline::{Action, ActionFamily, Callback, HookContext, Priority, RegisteredCallback, Stage};
use crate::schema::{Feature, ModelSpec};
use crate::storage::{Filter, FindOptions, IndexSpec, ReadQuery, SortKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "published";

pub const VERSION: &str = "version";
pub const VERSION_TOKEN: &str = "versionToken";
pub const PUBLISHED_VERSION: &str = "publishedVersion";
pub const FIRST_PUBLISHED_AT: &str = "firstPublishedAt";
pub const LAST_PUBLISHED_AT: &str = "lastPublishedAt";

/// Snapshot reference to its document
pub const DOCUMENT_ID: &str = "documentId";
/// Field a `versions=true` get attaches the history under
pub const VERSIONS: &str = "versions";

const SNAPSHOT_KEYS: [&str; 5] = [DOCUMENT_ID, VERSION, VERSION_TOKEN, CREATED_AT, CREATED_BY];

/// Publication state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishState {
    Unversioned,
    Draft,
    Published,
    PublishedStale,
}

impl PublishState {
    pub fn of(doc: &Document) -> Self {
        match (int(doc, VERSION), int(doc, PUBLISHED_VERSION)) {
            (None, _) => Self::Unversioned,
            (Some(_), None) => Self::Draft,
            (Some(version), Some(published)) if published >= version => Self::Published,
            _ => Self::PublishedStale,
        }
    }
}

/// Publication transition of a save, for notification collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishEvent {
    FirstPublish,
    /// Published again after having been unpublished
    Republish,
    /// Already published, now publishing a different version
    PublishChange,
    Unpublish,
}

impl PublishEvent {
    pub fn classify(previous: Option<&Document>, current: &Document) -> Option<Self> {
        let before = previous.and_then(|d| int(d, PUBLISHED_VERSION));
        match (before, int(current, PUBLISHED_VERSION)) {
            (None, Some(_)) if previous.is_some_and(|d| d.has_value(FIRST_PUBLISHED_AT)) => Some(Self::Republish),
            (None, Some(_)) => Some(Self::FirstPublish),
            (Some(a), Some(b)) if a != b => Some(Self::PublishChange),
            (Some(_), None) => Some(Self::Unpublish),
            _ => None,
        }
    }
}

/// Receives publication transitions after the save committed
#[async_trait]
pub trait PublishNotifier: Send + Sync {
    async fn notify(&self, event: PublishEvent, model: &str, doc: &Document) -> Result<()>;
}

pub fn feature(notifier: Option<Arc<dyn PublishNotifier>>) -> Feature {
    let internal = json!({ "writable": false, "versioned": false });
    let stamp = json!({ "type": "string", "format": "date-time", "x-meta": { "writable": false, "versioned": false } });

    Feature::new(NAME)
        .with_schema(json!({
            "properties": {
                VERSION: { "type": "integer", "minimum": 1, "x-meta": internal.clone() },
                VERSION_TOKEN: { "type": "string", "x-meta": internal },
                PUBLISHED_VERSION: { "type": ["integer", "null"], "minimum": 1, "x-meta": { "versioned": false } },
                FIRST_PUBLISHED_AT: stamp.clone(),
                LAST_PUBLISHED_AT: stamp,
            }
        }))
        .with_callback(RegisteredCallback::new(
            "stampVersion",
            ActionFamily::Save,
            Stage::BeforeValidation,
            Arc::new(StampVersion),
        ))
        .with_callback(RegisteredCallback::new(
            "writeSnapshot",
            ActionFamily::Save,
            Stage::AfterSave,
            Arc::new(WriteSnapshot { notifier }),
        ))
        .with_callback(RegisteredCallback::new(
            "removeSnapshots",
            ActionFamily::Delete,
            Stage::After,
            Arc::new(RemoveSnapshots),
        ))
        .with_callback(RegisteredCallback::new(
            "publishedFilter",
            ActionFamily::Read,
            Stage::Before,
            Arc::new(PublishedFilter),
        ))
        .with_callback(
            RegisteredCallback::new("resolvePublished", ActionFamily::Read, Stage::After, Arc::new(ResolvePublished))
                .with_priority(Priority::First),
        )
}

fn int(doc: &Document, key: &str) -> Option<u64> {
    doc.get(key).and_then(Value::as_u64)
}

fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn versions_collection(ctx: &HookContext) -> String {
    ctx.config().versioning.collection_for(&ctx.spec.collection)
}

/// Whether `key` belongs in a snapshot
fn snapshotted(ctx: &HookContext, key: &str) -> bool {
    key != ctx.config().models.identity_field && ctx.spec.is_versioned(key)
}

fn versioned_change(spec: &ModelSpec, before: &Document, after: &Document) -> bool {
    let differs = |key: &String| spec.is_versioned(key) && before.get(key) != after.get(key);
    before.keys().any(differs) || after.keys().any(differs)
}

struct StampVersion;

#[async_trait]
impl Callback for StampVersion {
    async fn on_document(&self, mut doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let existing = ctx.existing.as_ref();
        let version = match existing {
            None => 1,
            Some(prev) => {
                let current = int(prev, VERSION).unwrap_or(1);
                let published_current = int(prev, PUBLISHED_VERSION).is_some_and(|p| p >= current);
                if published_current && versioned_change(&ctx.spec, prev, &doc) {
                    doc.set(VERSION_TOKEN, new_token());
                    log::debug!("{}: cutting version {}", ctx.spec.name, current + 1);
                    current + 1
                } else {
                    current
                }
            }
        };
        doc.set(VERSION, version);

        let published = match int(&doc, PUBLISHED_VERSION) {
            Some(p) if p > version => {
                doc.set(PUBLISHED_VERSION, version);
                Some(version)
            }
            other => other,
        };

        if published.is_some() && published != existing.and_then(|e| int(e, PUBLISHED_VERSION)) {
            let now = super::now();
            if !doc.has_value(VERSION_TOKEN) {
                doc.set(VERSION_TOKEN, new_token());
            }
            if !doc.has_value(FIRST_PUBLISHED_AT) {
                doc.set(FIRST_PUBLISHED_AT, now.clone());
            }
            doc.set(LAST_PUBLISHED_AT, now);
        }
        Ok(Some(doc))
    }
}

struct WriteSnapshot {
    notifier: Option<Arc<dyn PublishNotifier>>,
}

impl WriteSnapshot {
    async fn upsert(&self, ctx: &HookContext, doc: &Document, id: &Value, version: u64, token: &Value) -> Result<()> {
        let storage = ctx.storage();
        let versions = versions_collection(ctx);
        storage.create_index(&versions, &IndexSpec::new([DOCUMENT_ID, VERSION], true)).await?;
        storage.create_index(&versions, &IndexSpec::new([DOCUMENT_ID, VERSION_TOKEN], true)).await?;

        let mut row = Document::new();
        row.set(DOCUMENT_ID, id.clone());
        row.set(VERSION, version);
        row.set(VERSION_TOKEN, token.clone());

        let filter = Filter::new().eq(DOCUMENT_ID, id.clone()).eq(VERSION, version);
        let previous = storage.find_one(&versions, &filter).await?;
        match &previous {
            Some(prev) => {
                row.set(CREATED_AT, prev.get(CREATED_AT).cloned().unwrap_or(Value::Null));
                row.set(CREATED_BY, prev.get(CREATED_BY).cloned().unwrap_or(Value::Null));
            }
            None => {
                row.set(CREATED_AT, super::now());
                row.set(CREATED_BY, ctx.actor().map_or(Value::Null, |a| Value::String(a.to_string())));
            }
        }
        for (key, value) in doc.iter() {
            if snapshotted(ctx, key) && !SNAPSHOT_KEYS.contains(&key.as_str()) {
                row.set(key.clone(), value.clone());
            }
        }

        if previous.is_some() {
            storage.update(&versions, &filter, row).await?;
        } else {
            storage.insert(&versions, row).await?;
            log::debug!("{}: snapshot v{} of {}", ctx.spec.name, version, identity_key(id));
        }
        Ok(())
    }
}

#[async_trait]
impl Callback for WriteSnapshot {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        if let (Some(token), Some(version), Some(id)) = (doc.get(VERSION_TOKEN), int(&doc, VERSION), ctx.identity_in(&doc)) {
            self.upsert(ctx, &doc, id, version, token).await?;
        }

        if let Some(notifier) = &self.notifier {
            if let Some(event) = PublishEvent::classify(ctx.existing.as_ref(), &doc) {
                log::info!("{}: publish event {:?}", ctx.spec.name, event);
                notifier.notify(event, &ctx.spec.name, &doc).await?;
            }
        }
        Ok(None)
    }
}

struct RemoveSnapshots;

#[async_trait]
impl Callback for RemoveSnapshots {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        if let Some(id) = ctx.identity_in(&doc) {
            let removed = ctx
                .storage()
                .remove(&versions_collection(ctx), &Filter::new().eq(DOCUMENT_ID, id.clone()))
                .await?;
            log::debug!("{}: removed {} snapshots of {}", ctx.spec.name, removed, identity_key(id));
        }
        Ok(None)
    }
}

struct PublishedFilter;

#[async_trait]
impl Callback for PublishedFilter {
    async fn on_query(&self, query: ReadQuery, ctx: &HookContext) -> Result<Option<ReadQuery>> {
        if !ctx.params().published {
            return Ok(None);
        }
        let filter = query.filter.and(Filter::new().present(PUBLISHED_VERSION));
        Ok(Some(ReadQuery { filter, options: query.options }))
    }
}

struct ResolvePublished;

#[async_trait]
impl Callback for ResolvePublished {
    async fn on_results(&self, docs: Vec<Document>, ctx: &HookContext) -> Result<Option<Vec<Document>>> {
        let published = ctx.params().published;
        let history = ctx.params().versions && ctx.action == Action::Get;
        if !published && !history {
            return Ok(None);
        }

        let ids: Vec<Value> = docs.iter().filter_map(|d| ctx.spec.identity_of(d).cloned()).collect();
        if ids.is_empty() {
            return Ok(None);
        }
        let options = FindOptions { sort: vec![SortKey::desc(VERSION)], ..FindOptions::default() };
        let rows = ctx
            .storage()
            .find(&versions_collection(ctx), &Filter::new().is_in(DOCUMENT_ID, ids), &options)
            .await?;

        let storage_id = ctx.config().models.identity_field.as_str();
        let mut resolved = Vec::with_capacity(docs.len());
        for doc in docs {
            let key = ctx.spec.identity_of(&doc).map(identity_key);
            let snapshots: Vec<&Document> =
                rows.iter().filter(|r| key.is_some() && r.get(DOCUMENT_ID).map(identity_key) == key).collect();

            let wanted = if published { int(&doc, PUBLISHED_VERSION) } else { None };
            let mut doc = match wanted.and_then(|v| snapshots.iter().find(|r| int(r, VERSION) == Some(v))) {
                Some(snapshot) => overlay(ctx, doc, snapshot, storage_id),
                None => doc,
            };

            if history {
                let entries = snapshots
                    .iter()
                    .map(|r| {
                        let mut entry = (*r).clone();
                        entry.remove(storage_id);
                        entry.into_value()
                    })
                    .collect();
                doc.set(VERSIONS, Value::Array(entries));
            }
            resolved.push(doc);
        }
        Ok(Some(resolved))
    }
}

/// Live non-versioned fields plus the snapshot's versioned ones
fn overlay(ctx: &HookContext, live: Document, snapshot: &Document, storage_id: &str) -> Document {
    let mut doc: Document = live.into_map().into_iter().filter(|(k, _)| !snapshotted(ctx, k)).collect();
    for (key, value) in snapshot.iter() {
        if key != storage_id && !SNAPSHOT_KEYS.contains(&key.as_str()) {
            doc.set(key.clone(), value.clone());
        }
    }
    doc
}
