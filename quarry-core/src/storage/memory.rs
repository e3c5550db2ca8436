//! In-memory storage backend
//!
//! Collections live in a `RwLock<HashMap>` and keep documents in insertion
//! order. Unique indexes are enforced on insert and update, sparsely:
//! documents missing any indexed key are not constrained.

use super::{compare_values, DbStats, Filter, FindOptions, IndexSpec, SortOrder, Storage, StorageResult};
use crate::document::Document;
use crate::error::StorageError;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const DEFAULT_ID_FIELD: &str = "_id";

#[derive(Debug, Default)]
struct Collection {
    docs: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    /// Reject `doc` if it collides with another document (`skip` excludes its own slot)
    fn check_unique(&self, name: &str, id_field: &str, doc: &Document, skip: Option<usize>) -> StorageResult<()> {
        let id_index = IndexSpec::single(id_field, true);
        for index in std::iter::once(&id_index).chain(self.indexes.iter().filter(|i| i.unique)) {
            let Some(key) = index_key(index, doc) else {
                continue;
            };
            let clash = self
                .docs
                .iter()
                .enumerate()
                .any(|(pos, other)| Some(pos) != skip && index_key(index, other).as_ref() == Some(&key));
            if clash {
                return Err(StorageError::DuplicateKey { collection: name.to_string(), index: index.name.clone() });
            }
        }
        Ok(())
    }

    fn matching(&self, filter: &Filter) -> StorageResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (pos, doc) in self.docs.iter().enumerate() {
            if filter.matches(doc)? {
                positions.push(pos);
            }
        }
        Ok(positions)
    }
}

fn index_key(index: &IndexSpec, doc: &Document) -> Option<Vec<Value>> {
    index
        .keys
        .iter()
        .map(|k| doc.get_path(k).filter(|v| !v.is_null()).cloned())
        .collect()
}

/// In-memory document database
///
/// `_id` is assigned to documents inserted without one; use
/// [`MemoryStorage::with_identity_field`] when `models.identity_field`
/// names another field.
///
/// # Example
///
/// ```
/// use quarry_core::storage::MemoryStorage;
///
/// let storage = MemoryStorage::new();
/// ```
#[derive(Clone)]
pub struct MemoryStorage {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    id_field: String,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::with_identity_field(DEFAULT_ID_FIELD)
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage assigning its identifiers under `field`
    pub fn with_identity_field(field: impl Into<String>) -> Self {
        Self { collections: Arc::new(RwLock::new(HashMap::new())), id_field: field.into() }
    }

    /// Number of documents currently stored in `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.read().map(|c| c.get(collection).map_or(0, |c| c.docs.len())).unwrap_or(0)
    }

    /// Names of the indexes defined on `collection`
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.read()
            .map(|c| c.get(collection).map(|c| c.indexes.iter().map(|i| i.name.clone()).collect()))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections.read().map_err(|_| poisoned())
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("memory storage lock poisoned".to_string())
}

fn sort_documents(docs: &mut [Document], options: &FindOptions) {
    if options.sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in &options.sort {
            let left = a.get_path(&key.field).unwrap_or(&Value::Null);
            let right = b.get_path(&key.field).unwrap_or(&Value::Null);
            let ordering = match key.order {
                SortOrder::Asc => compare_values(left, right),
                SortOrder::Desc => compare_values(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(doc: Document, id_field: &str, fields: &[String]) -> Document {
    doc.into_map()
        .into_iter()
        .filter(|(k, _)| k == id_field || fields.iter().any(|f| f == k))
        .collect()
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>> {
        let mut found = {
            let collections = self.read()?;
            let Some(coll) = collections.get(collection) else {
                return Ok(Vec::new());
            };
            coll.matching(filter)?.into_iter().map(|pos| coll.docs[pos].clone()).collect::<Vec<_>>()
        };

        sort_documents(&mut found, options);
        let page = found.into_iter().skip(options.skip).take(options.limit.unwrap_or(usize::MAX));
        Ok(match &options.projection {
            Some(fields) => page.map(|doc| project(doc, &self.id_field, fields)).collect(),
            None => page.collect(),
        })
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StorageResult<Document> {
        if !doc.has_value(&self.id_field) {
            doc.set(self.id_field.clone(), uuid::Uuid::new_v4().to_string());
        }
        let mut collections = self.write()?;
        let coll = collections.entry(collection.to_string()).or_default();
        coll.check_unique(collection, &self.id_field, &doc, None)?;
        coll.docs.push(doc.clone());
        Ok(doc)
    }

    async fn update(&self, collection: &str, filter: &Filter, mut doc: Document) -> StorageResult<u64> {
        let mut collections = self.write()?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(&pos) = coll.matching(filter)?.first() else {
            return Ok(0);
        };
        if !doc.has_value(&self.id_field) {
            if let Some(id) = coll.docs[pos].get(&self.id_field).cloned() {
                doc.set(self.id_field.clone(), id);
            }
        }
        coll.check_unique(collection, &self.id_field, &doc, Some(pos))?;
        coll.docs[pos] = doc;
        Ok(1)
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let mut collections = self.write()?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let doomed = coll.matching(filter)?;
        let mut pos = 0;
        coll.docs.retain(|_| {
            let keep = doomed.binary_search(&pos).is_err();
            pos += 1;
            keep
        });
        Ok(doomed.len() as u64)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let collections = self.read()?;
        Ok(collections.get(collection).map(|c| c.matching(filter)).transpose()?.map_or(0, |m| m.len() as u64))
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        let mut collections = self.write()?;
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.indexes.iter().any(|i| i.name == index.name) {
            return Ok(());
        }
        if index.unique {
            let mut seen: Vec<Vec<Value>> = Vec::new();
            for doc in &coll.docs {
                if let Some(key) = index_key(index, doc) {
                    if seen.contains(&key) {
                        return Err(StorageError::DuplicateKey {
                            collection: collection.to_string(),
                            index: index.name.clone(),
                        });
                    }
                    seen.push(key);
                }
            }
        }
        log::debug!("Created index {} on {}", index.name, collection);
        coll.indexes.push(index.clone());
        Ok(())
    }

    async fn stats(&self) -> StorageResult<DbStats> {
        let collections = self.read()?;
        Ok(DbStats {
            collections: collections.len(),
            documents: collections.values().map(|c| c.docs.len() as u64).sum(),
            indexes: collections.values().map(|c| c.indexes.len()).sum(),
        })
    }

    fn identity_field(&self) -> &str {
        &self.id_field
    }
}
