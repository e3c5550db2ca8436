//! Storage collaborator boundary
//!
//! The engine never implements its own storage engine; it talks to a
//! document database through the [`Storage`] trait. Collections are named by
//! string, documents are JSON objects, and filters use a small Mongo-style
//! predicate language (see [`Filter`]).
//!
//! [`MemoryStorage`] is the reference backend used by tests and embedded
//! deployments.

pub mod filter;
pub mod memory;

pub use filter::{compare_values, Filter};
pub use memory::MemoryStorage;

use crate::document::Document;
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result type of storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One sort criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Desc }
    }

    /// Parse `field` (ascending) or `-field` (descending)
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        match spec.strip_prefix('-') {
            Some("") => None,
            Some(field) => Some(Self::desc(field)),
            None if spec.is_empty() => None,
            None => Some(Self::asc(spec.strip_prefix('+').unwrap_or(spec))),
        }
    }
}

/// Sort, pagination and projection for a find
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
    pub skip: usize,
    /// Fields to return; `None` returns whole documents
    pub projection: Option<Vec<String>>,
}

impl FindOptions {
    pub fn limit(limit: usize) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }
}

/// Index definition for a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    /// Index named after its keys (`title_1`, `documentId_1_version_1`)
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>, unique: bool) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let name = keys.iter().map(|k| format!("{}_1", k)).collect::<Vec<_>>().join("_");
        Self { name, keys, unique }
    }

    pub fn single(key: impl Into<String>, unique: bool) -> Self {
        Self::new([key.into()], unique)
    }
}

/// Aggregate figures reported by `db_stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub collections: usize,
    pub documents: u64,
    pub indexes: usize,
}

/// A read as seen by read-side `before` callbacks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadQuery {
    pub filter: Filter,
    pub options: FindOptions,
}

/// Document database collaborator
///
/// Implement this trait to plug a real database in. Every call is a
/// suspension point of the pipeline.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Documents matching `filter`, sorted, paginated and projected
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>>;

    /// First document matching `filter`
    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        Ok(self.find(collection, filter, &FindOptions::limit(1)).await?.into_iter().next())
    }

    /// Insert a document, returning it with its store-assigned identifier
    async fn insert(&self, collection: &str, doc: Document) -> StorageResult<Document>;

    /// Replace the first document matching `filter`; returns the number replaced
    async fn update(&self, collection: &str, filter: &Filter, doc: Document) -> StorageResult<u64>;

    /// Remove every document matching `filter`; returns the number removed
    async fn remove(&self, collection: &str, filter: &Filter) -> StorageResult<u64>;

    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64>;

    /// Create an index; creating an existing index is a no-op
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()>;

    async fn stats(&self) -> StorageResult<DbStats>;

    /// Field the backend assigns identifiers under
    fn identity_field(&self) -> &str {
        "_id"
    }
}

#[async_trait::async_trait]
impl<S: Storage + ?Sized> Storage for Arc<S> {
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>> {
        (**self).find(collection, filter, options).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        (**self).find_one(collection, filter).await
    }

    async fn insert(&self, collection: &str, doc: Document) -> StorageResult<Document> {
        (**self).insert(collection, doc).await
    }

    async fn update(&self, collection: &str, filter: &Filter, doc: Document) -> StorageResult<u64> {
        (**self).update(collection, filter, doc).await
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        (**self).remove(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        (**self).count(collection, filter).await
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        (**self).create_index(collection, index).await
    }

    async fn stats(&self) -> StorageResult<DbStats> {
        (**self).stats().await
    }

    fn identity_field(&self) -> &str {
        (**self).identity_field()
    }
}
