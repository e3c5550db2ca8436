//! Translated properties
//!
//! A property flagged `translated` stores one value per language:
//! `{ "title": { "en": "Hello", "fr": "Bonjour" } }`. Reads with `lang=fr`
//! collapse it to the French value, falling back to the configured default
//! language. Saves with `lang=fr` accept a plain value and file it under `fr`.

use crate::document::Document;
use crate::error::Result;
use crate::pipeline::{ActionFamily, Callback, HookContext, RegisteredCallback, Stage};
use crate::schema::Feature;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const NAME: &str = "translations";

pub fn feature() -> Feature {
    Feature::new(NAME)
        .with_callback(RegisteredCallback::new(
            "fileTranslation",
            ActionFamily::Save,
            Stage::BeforeValidation,
            Arc::new(FileTranslation),
        ))
        .with_callback(RegisteredCallback::new(
            "resolveTranslations",
            ActionFamily::Read,
            Stage::After,
            Arc::new(ResolveTranslations),
        ))
}

fn translated(ctx: &HookContext) -> Vec<&str> {
    ctx.spec.schema.properties.iter().filter(|(_, p)| p.meta.translated).map(|(n, _)| n.as_str()).collect()
}

struct FileTranslation;

#[async_trait]
impl Callback for FileTranslation {
    async fn on_document(&self, mut doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let Some(lang) = ctx.params().lang.clone() else {
            return Ok(None);
        };
        let mut changed = false;
        for property in translated(ctx) {
            let Some(value) = doc.get(property) else { continue };
            if value.is_object() || value.is_null() {
                continue;
            }

            let mut by_language = ctx
                .existing
                .as_ref()
                .and_then(|e| e.get(property))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(Map::new);
            by_language.insert(lang.clone(), value.clone());
            doc.set(property, Value::Object(by_language));
            changed = true;
        }
        Ok(changed.then_some(doc))
    }
}

struct ResolveTranslations;

#[async_trait]
impl Callback for ResolveTranslations {
    async fn on_results(&self, mut docs: Vec<Document>, ctx: &HookContext) -> Result<Option<Vec<Document>>> {
        let Some(lang) = ctx.params().lang.as_deref() else {
            return Ok(None);
        };
        let properties = translated(ctx);
        if properties.is_empty() {
            return Ok(None);
        }
        let fallback = ctx.config().translations.default_language.as_str();

        for doc in &mut docs {
            for property in &properties {
                let resolved = doc
                    .get(property)
                    .and_then(Value::as_object)
                    .and_then(|by_language| by_language.get(lang).or_else(|| by_language.get(fallback)))
                    .cloned();
                if let Some(value) = resolved {
                    doc.set(*property, value);
                }
            }
        }
        Ok(Some(docs))
    }
}
