//! Sequence numbers for properties flagged `sequence`
//!
//! Counters live in the tenant's `counters` collection as
//! `{ "name": "<collection>.<property>", "value": <last assigned> }`.

use crate::document::Document;
use crate::error::Result;
use crate::pipeline::{ActionFamily, Callback, HookContext, RegisteredCallback, Stage};
use crate::schema::Feature;
use crate::storage::{Filter, IndexSpec, Storage};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "sequence";

pub const COUNTERS: &str = "counters";

pub fn feature() -> Feature {
    Feature::new(NAME).with_callback(RegisteredCallback::new(
        "assignSequence",
        ActionFamily::Create,
        Stage::BeforeValidation,
        Arc::new(AssignSequence),
    ))
}

/// Advance the named counter and return its new value
pub async fn next_value(storage: &dyn Storage, name: &str) -> Result<u64> {
    storage.create_index(COUNTERS, &IndexSpec::single("name", true)).await?;
    let filter = Filter::new().eq("name", name);

    match storage.find_one(COUNTERS, &filter).await? {
        Some(counter) => {
            let next = counter.get("value").and_then(Value::as_u64).unwrap_or(0) + 1;
            let mut updated = counter;
            updated.set("value", next);
            storage.update(COUNTERS, &filter, updated).await?;
            Ok(next)
        }
        None => {
            let mut counter = Document::new();
            counter.set("name", name);
            counter.set("value", 1);
            storage.insert(COUNTERS, counter).await?;
            Ok(1)
        }
    }
}

struct AssignSequence;

#[async_trait]
impl Callback for AssignSequence {
    async fn on_document(&self, mut doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let pending: Vec<String> = ctx
            .spec
            .schema
            .properties
            .iter()
            .filter(|(name, prop)| prop.meta.sequence && !doc.has_value(name))
            .map(|(name, _)| name.clone())
            .collect();
        if pending.is_empty() {
            return Ok(None);
        }

        for name in pending {
            let counter = format!("{}.{}", ctx.spec.collection, name);
            let value = next_value(ctx.storage().as_ref(), &counter).await?;
            log::debug!("{}: {} = {}", ctx.spec.name, name, value);
            doc.set(name, value);
        }
        Ok(Some(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_counters_advance_independently() {
        let storage = MemoryStorage::new();
        assert_eq!(next_value(&storage, "tickets.number").await.unwrap(), 1);
        assert_eq!(next_value(&storage, "tickets.number").await.unwrap(), 2);
        assert_eq!(next_value(&storage, "invoices.number").await.unwrap(), 1);
        assert_eq!(storage.len(COUNTERS), 2);
    }
}
