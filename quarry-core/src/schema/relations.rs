//! Relationship metadata and reference helpers
//!
//! A relationship is declared on a schema property through
//! `x-meta.relationship`. Values are references: either a bare identity
//! (`"a1"`) or an object carrying an `id` plus an optional payload
//! (`{ "id": "a1", "type": "authors", "role": "editor" }`).

use crate::document::identity_key;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Relationship cardinality, read from the property's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// The property holds an array of references
    pub fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// What happens to a dependent when the document it requires goes away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDelete {
    /// Clear the reference (vetoed when the reference is required)
    #[default]
    Detach,
    /// Delete the dependent too
    Cascade,
}

/// Relationship declared on a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Relationship {
    /// Target model name
    pub to_type: String,
    /// Reciprocal property on the target; present for two-way relationships
    #[serde(default)]
    pub to_field: Option<String>,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub on_delete: OnDelete,
    /// Key expanded documents are spliced under, defaults to the property name
    #[serde(default)]
    pub name: Option<String>,
}

impl Relationship {
    pub fn is_two_way(&self) -> bool {
        self.to_field.is_some()
    }

    pub fn logical_name<'a>(&'a self, property: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(property)
    }
}

/// One reference held by a relationship property
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub id: Value,
    /// The raw entry as stored (bare id or object)
    pub entry: Value,
}

impl Reference {
    pub fn key(&self) -> String {
        identity_key(&self.id)
    }
}

/// Identity referenced by a single entry
pub fn reference_id(entry: &Value) -> Option<Value> {
    match entry {
        Value::String(_) | Value::Number(_) => Some(entry.clone()),
        Value::Object(map) => map.get("id").filter(|v| !v.is_null()).cloned(),
        _ => None,
    }
}

/// All references held by a property value, singular or array
pub fn references(value: Option<&Value>) -> Vec<Reference> {
    let entries: Vec<&Value> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    };
    entries
        .into_iter()
        .filter_map(|entry| reference_id(entry).map(|id| Reference { id, entry: entry.clone() }))
        .collect()
}

/// Entry to store on the reciprocal side for a source entry.
///
/// Bare ids mirror as the source identity; object entries keep their payload
/// with `id` (and `type`, when present) pointing back at the source.
pub fn mirror_entry(source_entry: &Value, source_id: &Value, source_model: &str) -> Value {
    match source_entry {
        Value::Object(map) => {
            let mut mirrored = map.clone();
            mirrored.insert("id".to_string(), source_id.clone());
            if mirrored.contains_key("type") {
                mirrored.insert("type".to_string(), Value::String(source_model.to_string()));
            }
            Value::Object(mirrored)
        }
        _ => source_id.clone(),
    }
}

/// Reference-level difference between two values of a relationship property
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceDiff {
    pub added: Vec<Reference>,
    pub removed: Vec<Reference>,
    /// Present on both sides with a different embedded payload (new entry kept)
    pub changed: Vec<Reference>,
}

impl ReferenceDiff {
    pub fn between(old: Option<&Value>, new: Option<&Value>) -> Self {
        let old_refs = references(old);
        let new_refs = references(new);
        let old_keys: HashSet<String> = old_refs.iter().map(Reference::key).collect();
        let new_keys: HashSet<String> = new_refs.iter().map(Reference::key).collect();

        let mut diff = Self::default();
        for reference in &new_refs {
            if !old_keys.contains(&reference.key()) {
                diff.added.push(reference.clone());
            } else if let Some(previous) = old_refs.iter().find(|r| r.key() == reference.key()) {
                if previous.entry != reference.entry {
                    diff.changed.push(reference.clone());
                }
            }
        }
        for reference in old_refs {
            if !new_keys.contains(&reference.key()) {
                diff.removed.push(reference);
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_references_accept_ids_and_objects() {
        let value = json!(["a1", { "id": "a2", "type": "articles" }, { "name": "no id" }]);
        let refs = references(Some(&value));
        let keys: Vec<_> = refs.iter().map(Reference::key).collect();
        assert_eq!(keys, vec!["a1", "a2"]);
    }

    #[test]
    fn test_reference_diff() {
        let old = json!(["a1", { "id": "a2", "role": "writer" }, "a3"]);
        let new = json!([{ "id": "a2", "role": "editor" }, "a3", "a4"]);
        let diff = ReferenceDiff::between(Some(&old), Some(&new));

        assert_eq!(diff.added.iter().map(Reference::key).collect::<Vec<_>>(), vec!["a4"]);
        assert_eq!(diff.removed.iter().map(Reference::key).collect::<Vec<_>>(), vec!["a1"]);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].entry["role"], "editor");
    }

    #[test]
    fn test_mirror_entry() {
        let entry = json!({ "id": "art-1", "type": "articles", "role": "editor" });
        let mirrored = mirror_entry(&entry, &json!("auth-1"), "authors");
        assert_eq!(mirrored, json!({ "id": "auth-1", "type": "authors", "role": "editor" }));

        assert_eq!(mirror_entry(&json!("art-1"), &json!("auth-1"), "authors"), json!("auth-1"));
    }

    #[test]
    fn test_cardinality_serde() {
        let rel: Relationship = serde_json::from_value(json!({
            "toType": "categories",
            "type": "many-to-many",
            "onDelete": "cascade"
        }))
        .unwrap();
        assert!(rel.cardinality.is_to_many());
        assert_eq!(rel.on_delete, OnDelete::Cascade);
        assert!(!rel.is_two_way());
        assert_eq!(rel.logical_name("categories"), "categories");
    }
}
