//! Search-index synchronisation
//!
//! Not registered by default: build it around an indexer and register it
//! with `ModelRegistry::register_feature`, then list `"search"` among a
//! model's features.

use crate::document::Document;
use crate::error::Result;
use crate::pipeline::{Action, ActionFamily, Callback, HookContext, Priority, RegisteredCallback, Stage};
use crate::schema::Feature;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "search";

/// Search-index collaborator
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index(&self, model: &str, doc: &Document) -> Result<()>;

    async fn remove(&self, model: &str, id: &Value) -> Result<()>;
}

pub fn feature(indexer: Arc<dyn SearchIndexer>) -> Feature {
    let sync = Arc::new(SyncIndex { indexer });
    Feature::new(NAME)
        .with_callback(
            RegisteredCallback::new("indexDocument", ActionFamily::Save, Stage::AfterSave, sync.clone())
                .with_priority(Priority::Last),
        )
        .with_callback(
            RegisteredCallback::new("unindexDocument", ActionFamily::Delete, Stage::After, sync)
                .with_priority(Priority::Last),
        )
}

struct SyncIndex {
    indexer: Arc<dyn SearchIndexer>,
}

#[async_trait]
impl Callback for SyncIndex {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        if ctx.action == Action::Delete {
            if let Some(id) = ctx.identity_in(&doc) {
                self.indexer.remove(&ctx.spec.name, id).await?;
            }
        } else {
            let mut visible = doc.clone();
            ctx.spec.strip_unreadable(&mut visible);
            self.indexer.index(&ctx.spec.name, &visible).await?;
        }
        Ok(None)
    }
}
