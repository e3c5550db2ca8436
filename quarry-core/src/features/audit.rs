//! Audit stamps: `createdAt/By` on create, `updatedAt/By` on every save

use crate::document::Document;
use crate::error::Result;
use crate::pipeline::{Action, ActionFamily, Callback, HookContext, Priority, RegisteredCallback, Stage};
use crate::schema::Feature;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "audit";

pub const CREATED_AT: &str = "createdAt";
pub const CREATED_BY: &str = "createdBy";
pub const UPDATED_AT: &str = "updatedAt";
pub const UPDATED_BY: &str = "updatedBy";

/// Fields maintained by this feature; left out of the unchanged check
pub const FIELDS: [&str; 4] = [CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY];

pub fn feature() -> Feature {
    let stamp = json!({ "type": "string", "format": "date-time", "x-meta": { "writable": false, "versioned": false } });
    let actor = json!({ "type": ["string", "null"], "x-meta": { "writable": false, "versioned": false } });

    Feature::new(NAME)
        .with_schema(json!({
            "properties": {
                CREATED_AT: stamp.clone(),
                CREATED_BY: actor.clone(),
                UPDATED_AT: stamp,
                UPDATED_BY: actor,
            }
        }))
        .with_callback(
            RegisteredCallback::new("stampAudit", ActionFamily::Save, Stage::BeforeValidation, Arc::new(Stamp))
                .with_priority(Priority::First),
        )
}

struct Stamp;

#[async_trait]
impl Callback for Stamp {
    async fn on_document(&self, mut doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let now = super::now();
        let actor = ctx.actor().map_or(Value::Null, |a| Value::String(a.to_string()));

        if ctx.action == Action::Create {
            doc.set(CREATED_AT, now.clone());
            doc.set(CREATED_BY, actor.clone());
        }
        doc.set(UPDATED_AT, now);
        doc.set(UPDATED_BY, actor);
        Ok(Some(doc))
    }
}
