//! Quarry - Core
//!
//! A multi-tenant, schema-driven document engine: the runtime underneath a
//! headless content API.
//!
//! # Overview
//!
//! Operators define *models* at runtime (a collection, a JSON Schema
//! annotated with `x-meta` extensions and a list of features). Quarry
//! composes each definition into an executable [`ModelSpec`](schema::ModelSpec)
//! and runs every document operation through that spec's callback pipeline:
//! validation, audit stamps, versioning and publishing, two-way relationship
//! propagation, changelog entries and relationship expansion on read.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use quarry_core::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(ModelRegistry::new(QuarryConfig::load()?));
//!     registry.add_tenant("acme", Arc::new(MemoryStorage::new()))?;
//!     registry.define_model(
//!         "acme",
//!         ModelDefinition::new("articles", json!({
//!             "properties": { "title": { "type": "string" } },
//!             "required": ["title"]
//!         }))
//!         .with_features(["published"]),
//!     )?;
//!
//!     let articles = registry.api_for("acme", "articles")?;
//!     let created = articles.create(doc!({ "title": "Hello" }), StoreOptions::new().as_actor("editor")).await?;
//!     println!("{}", created.to_value());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`schema`] - Schema tree, relationship metadata, validation and composition
//! - [`pipeline`] - Lifecycle callbacks, stages and priorities
//! - [`store`] - `DocumentStore`: list/get/create/update/delete
//! - [`features`] - Built-in features (audit, changelog, published, relationships, ...)
//! - [`registry`] - Tenants, model definitions and the composed-spec cache
//! - [`storage`] - Storage collaborator trait, filter language, in-memory backend

pub mod config; // Layered TOML + environment configuration
pub mod diff;
pub mod document;
pub mod error;
pub mod features;
pub mod logging; // `log` backend with human/JSON/logfmt output
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod storage;
pub mod store;

pub mod prelude;

// Used by the `doc!` macro
pub use serde_json;

pub use config::QuarryConfig;
pub use document::Document;
pub use error::{QuarryError, Result};
pub use registry::{ModelRegistry, ModelResolver};
pub use schema::{Feature, ModelDefinition, ModelSpec};
pub use storage::{Filter, MemoryStorage, Storage};
pub use store::{DocumentStore, QueryParams, StoreOptions};
