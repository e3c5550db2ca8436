//! Changelog: one append-only entry per committed save or delete
//!
//! Entries are written to the configured changelog collection of the
//! tenant's storage:
//!
//! ```json
//! { "action": "update", "coll": "articles", "docId": "a1",
//!   "doc": { "_id": "a1", "title": "B" },
//!   "changes": [{ "path": "title", "kind": "changed", "from": "A", "to": "B" }],
//!   "createdBy": "editor", "createdAt": "2024-05-01T10:00:00.000Z" }
//! ```
//!
//! A [`ChangelogSink`] receives the same event for external audit trails.

use crate::diff::{diff_documents, Change};
use crate::document::Document;
use crate::error::Result;
use crate::features::audit;
use crate::pipeline::{Action, ActionFamily, Callback, HookContext, Priority, RegisteredCallback, Stage};
use crate::schema::Feature;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "changelog";

/// A committed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub action: Action,
    pub coll: String,
    pub doc_id: Value,
    /// Saved document, or the removed one for a delete
    pub doc: Document,
    pub changes: Vec<Change>,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// Receives every changelog entry after it has been stored
#[async_trait]
pub trait ChangelogSink: Send + Sync {
    async fn record(&self, entry: &ChangelogEntry) -> Result<()>;
}

pub fn feature(sink: Option<Arc<dyn ChangelogSink>>) -> Feature {
    let recorder = Arc::new(Recorder { sink });
    Feature::new(NAME)
        .with_callback(
            RegisteredCallback::new("recordSave", ActionFamily::Save, Stage::AfterSave, recorder.clone())
                .with_priority(Priority::Last),
        )
        .with_callback(
            RegisteredCallback::new("recordDelete", ActionFamily::Delete, Stage::After, recorder)
                .with_priority(Priority::Last),
        )
}

struct Recorder {
    sink: Option<Arc<dyn ChangelogSink>>,
}

#[async_trait]
impl Callback for Recorder {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let settings = &ctx.config().changelog;
        if !settings.enabled {
            return Ok(None);
        }

        let empty = Document::new();
        let changes = match (ctx.action, &ctx.existing) {
            (Action::Delete, _) => diff_documents(&doc, &empty, &audit::FIELDS),
            (_, Some(existing)) => diff_documents(existing, &doc, &audit::FIELDS),
            (_, None) => diff_documents(&empty, &doc, &audit::FIELDS),
        };
        let entry = ChangelogEntry {
            action: ctx.action,
            coll: ctx.spec.collection.clone(),
            doc_id: ctx.identity_in(&doc).cloned().unwrap_or(Value::Null),
            doc,
            changes,
            created_by: ctx.actor().map(str::to_string),
            created_at: super::now(),
        };

        let row = serde_json::to_value(&entry)
            .ok()
            .and_then(Document::from_value)
            .unwrap_or_default();
        ctx.storage().insert(&settings.collection, row).await?;
        log::debug!("{}: changelog {} {}", ctx.spec.name, entry.action, entry.doc_id);

        if let Some(sink) = &self.sink {
            sink.record(&entry).await?;
        }
        Ok(None)
    }
}
