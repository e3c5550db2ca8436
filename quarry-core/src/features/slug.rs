//! Slugs derived from another property (`slug: { from: "title" }`)

use crate::document::Document;
use crate::error::Result;
use crate::pipeline::{ActionFamily, Callback, HookContext, RegisteredCallback, Stage};
use crate::schema::Feature;
use crate::storage::Filter;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "slug";

pub fn feature() -> Feature {
    Feature::new(NAME).with_callback(RegisteredCallback::new(
        "deriveSlug",
        ActionFamily::Save,
        Stage::BeforeValidation,
        Arc::new(DeriveSlug),
    ))
}

/// Lowercase, non-alphanumeric runs become a single `-`
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut gap = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c);
            gap = false;
        } else {
            gap = true;
        }
    }
    slug
}

struct DeriveSlug;

impl DeriveSlug {
    /// First of `base`, `base-2`, `base-3`, ... not used by another document
    async fn unique(ctx: &HookContext, property: &str, base: &str, own_id: Option<&Value>) -> Result<String> {
        let mut candidate = base.to_string();
        let mut suffix = 1;
        loop {
            let mut filter = Filter::new().eq(property, candidate.clone());
            if let Some(id) = own_id {
                filter = filter.with(ctx.spec.identity.clone(), json!({ "$ne": id }));
            }
            if ctx.storage().count(&ctx.spec.collection, &filter).await? == 0 {
                return Ok(candidate);
            }
            suffix += 1;
            candidate = format!("{}-{}", base, suffix);
        }
    }
}

#[async_trait]
impl Callback for DeriveSlug {
    async fn on_document(&self, mut doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let mut changed = false;
        for (property, schema) in &ctx.spec.schema.properties {
            let Some(source) = &schema.meta.slug else { continue };
            if doc.has_value(property) {
                continue;
            }
            let Some(text) = doc.get(&source.from).and_then(Value::as_str) else { continue };
            let base = slugify(text);
            if base.is_empty() {
                continue;
            }

            let slug = Self::unique(ctx, property, &base, ctx.identity_in(&doc)).await?;
            log::debug!("{}: {} = {}", ctx.spec.name, property, slug);
            doc.set(property.clone(), slug);
            changed = true;
        }
        Ok(changed.then_some(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust & Tokio -- 2024 "), "rust-tokio-2024");
        assert_eq!(slugify("Crème Brûlée"), "crème-brûlée");
        assert_eq!(slugify("!!!"), "");
    }
}
