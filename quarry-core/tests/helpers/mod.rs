//! Shared fixtures for the integration tests
#![allow(dead_code)]

use quarry_core::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

pub const TENANT: &str = "acme";

pub struct Fixture {
    pub registry: Arc<ModelRegistry>,
    pub storage: Arc<MemoryStorage>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(QuarryConfig::default())
    }

    pub fn with_config(config: QuarryConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let storage = Arc::new(MemoryStorage::with_identity_field(config.models.identity_field.clone()));
        let registry = Arc::new(ModelRegistry::new(config));
        registry.add_tenant(TENANT, storage.clone()).expect("tenant storage should register");
        Self { registry, storage }
    }

    pub fn define(&self, def: ModelDefinition) {
        self.registry.define_model(TENANT, def).expect("model definition should compose");
    }

    pub fn api(&self, model: &str) -> DocumentStore {
        self.registry.api_for(TENANT, model).expect("model should resolve")
    }

    /// authors <-> articles <-> categories
    pub fn blog(author_required: bool, on_delete: &str) -> Self {
        let fixture = Self::new();
        fixture.define(authors());
        fixture.define(articles(author_required, on_delete));
        fixture.define(categories());
        fixture
    }
}

pub fn authors() -> ModelDefinition {
    ModelDefinition::new(
        "authors",
        json!({
            "properties": {
                "name": { "type": "string", "minLength": 1 },
                "email": { "type": "string", "format": "email", "x-meta": { "unique": true } },
                "articles": {
                    "type": "array",
                    "items": { "type": "string" },
                    "x-meta": { "relationship": { "toType": "articles", "toField": "author", "type": "one-to-many" } }
                }
            },
            "required": ["name"]
        }),
    )
}

pub fn articles(author_required: bool, on_delete: &str) -> ModelDefinition {
    let required: Vec<&str> = if author_required { vec!["title", "author"] } else { vec!["title"] };
    ModelDefinition::new(
        "articles",
        json!({
            "properties": {
                "title": { "type": "string" },
                "body": { "type": "string" },
                "author": {
                    "type": "string",
                    "x-meta": { "relationship": {
                        "toType": "authors", "toField": "articles", "type": "many-to-one", "onDelete": on_delete
                    } }
                },
                "categories": {
                    "type": "array",
                    "items": { "type": "string" },
                    "x-meta": { "relationship": { "toType": "categories", "toField": "articles", "type": "many-to-many" } }
                }
            },
            "required": required
        }),
    )
    .with_features(["published"])
}

pub fn categories() -> ModelDefinition {
    ModelDefinition::new(
        "categories",
        json!({
            "properties": {
                "name": { "type": "string" },
                "articles": {
                    "type": "array",
                    "items": { "type": "string" },
                    "x-meta": { "relationship": { "toType": "articles", "toField": "categories", "type": "many-to-many" } }
                }
            }
        }),
    )
}

pub fn id_of(doc: &Document) -> Value {
    doc.get("_id").cloned().expect("stored documents carry an _id")
}

pub fn editor() -> StoreOptions {
    StoreOptions::new().as_actor("editor")
}

pub fn params(pairs: &[(&str, &str)]) -> StoreOptions {
    let params = QueryParams::from_pairs(pairs.iter().copied()).expect("query parameters should parse");
    StoreOptions::new().with_params(params)
}
