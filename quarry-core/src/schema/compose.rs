//! Schema Composer
//!
//! Composition is a pure function: a [`ModelDefinition`] plus the
//! [`Feature`]s it names produce one immutable [`ModelSpec`]. Schema
//! fragments are deep-merged, callbacks are sorted once into a
//! [`CallbackTable`], and the identity property and effective index list are
//! resolved here so that no request has to re-derive them.

use crate::document::Document;
use crate::error::SpecError;
use crate::pipeline::{CallbackTable, RegisteredCallback};
use crate::schema::property::PropertySchema;
use crate::schema::relations::Relationship;
use crate::storage::{Filter, IndexSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model as administered at runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Model (type) name, e.g. `articles`
    pub name: String,
    /// Collection name, defaults to the model name
    #[serde(default)]
    pub collection: Option<String>,
    /// JSON Schema of the documents, with `x-meta` annotations
    pub schema: Value,
    /// Feature names mixed in after the configured defaults
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    /// Model-specific callbacks, run before feature callbacks of the same priority
    #[serde(skip)]
    pub callbacks: Vec<RegisteredCallback>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self { name: name.into(), schema, ..Self::default() }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_callback(mut self, callback: RegisteredCallback) -> Self {
        self.callbacks.push(callback);
        self
    }
}

/// A reusable fragment of schema, callbacks and indexes
#[derive(Debug, Clone)]
pub struct Feature {
    pub name: String,
    /// Schema fragment deep-merged into the model schema
    pub schema: Value,
    pub callbacks: Vec<RegisteredCallback>,
    pub indexes: Vec<IndexSpec>,
}

impl Feature {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), schema: Value::Object(Map::new()), callbacks: Vec::new(), indexes: Vec::new() }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_callback(mut self, callback: RegisteredCallback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }
}

/// Executable, immutable configuration of one model
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub collection: String,
    /// Merged JSON Schema, as composed
    pub json_schema: Value,
    pub schema: PropertySchema,
    /// Name of the identity property
    pub identity: String,
    pub indexes: Vec<IndexSpec>,
    /// Features applied, in composition order
    pub features: Vec<String>,
    pub callbacks: CallbackTable,
}

impl ModelSpec {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.schema.property(name)
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }

    /// Relationship properties in declaration order
    pub fn relationships(&self) -> impl Iterator<Item = (&str, &PropertySchema, &Relationship)> {
        self.schema
            .properties
            .iter()
            .filter_map(|(name, prop)| prop.meta.relationship.as_ref().map(|rel| (name.as_str(), prop, rel)))
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.property(name).and_then(|p| p.meta.relationship.as_ref())
    }

    /// Undeclared fields count as versioned
    pub fn is_versioned(&self, field: &str) -> bool {
        field != self.identity && self.property(field).map_or(true, |p| p.meta.versioned)
    }

    pub fn is_readable(&self, field: &str) -> bool {
        self.property(field).map_or(true, |p| p.meta.readable)
    }

    pub fn is_writable(&self, field: &str) -> bool {
        self.property(field).map_or(true, |p| p.meta.writable)
    }

    pub fn identity_of<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        doc.get(&self.identity).filter(|v| !v.is_null())
    }

    pub fn identity_filter(&self, id: impl Into<Value>) -> Filter {
        Filter::new().eq(self.identity.clone(), id)
    }

    /// Remove caller-supplied fields flagged `writable: false`
    pub fn strip_unwritable(&self, doc: &mut Document) {
        doc.retain(|key, _| self.is_writable(key));
    }

    /// Remove fields flagged `readable: false`
    pub fn strip_unreadable(&self, doc: &mut Document) {
        doc.retain(|key, _| self.is_readable(key));
    }
}

/// Compose a model definition with its features into a [`ModelSpec`].
///
/// `fallback_identity` names the store-assigned identifier used when no
/// property carries the `id` flag.
pub fn compose(
    def: &ModelDefinition,
    features: &[&Feature],
    fallback_identity: &str,
) -> Result<ModelSpec, SpecError> {
    let mut json_schema = match &def.schema {
        Value::Null => Value::Object(Map::new()),
        schema => schema.clone(),
    };
    if let Value::Object(root) = &mut json_schema {
        root.entry("type").or_insert_with(|| Value::String("object".to_string()));
    }

    let mut callbacks: Vec<RegisteredCallback> = def
        .callbacks
        .iter()
        .cloned()
        .map(|mut cb| {
            cb.feature = def.name.clone();
            cb
        })
        .collect();
    let mut indexes = def.indexes.clone();

    for feature in features {
        merge_fragment(&mut json_schema, &feature.schema, "")?;
        callbacks.extend(feature.callbacks.iter().cloned().map(|mut cb| {
            cb.feature = feature.name.clone();
            cb
        }));
        indexes.extend(feature.indexes.iter().cloned());
    }

    let mut schema = PropertySchema::parse(&json_schema, "")?;
    let identity = resolve_identity(&def.name, &schema, fallback_identity)?;
    if identity != fallback_identity && !schema.is_required(&identity) {
        schema.required.push(identity.clone());
        if let Value::Object(root) = &mut json_schema {
            let required = root.entry("required").or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(names) = required {
                names.push(Value::String(identity.clone()));
            }
        }
    }

    for (name, prop) in &schema.properties {
        derive_indexes(name, prop, &mut indexes);
    }
    if identity != fallback_identity {
        indexes.push(IndexSpec::single(identity.clone(), true));
    }

    let spec = ModelSpec {
        name: def.name.clone(),
        collection: def.collection.clone().unwrap_or_else(|| def.name.clone()),
        json_schema,
        schema,
        identity,
        indexes: dedupe_indexes(indexes),
        features: features.iter().map(|f| f.name.clone()).collect(),
        callbacks: CallbackTable::build(callbacks)?,
    };
    log::info!(
        "Composed model {} (collection {}, identity {}, features [{}], {} callbacks)",
        spec.name,
        spec.collection,
        spec.identity,
        spec.features.join(", "),
        spec.callbacks.len()
    );
    Ok(spec)
}

/// Deep-merge `fragment` into `target`.
///
/// Objects merge key by key, `required` arrays concatenate without
/// duplicates, equal values merge silently and anything else conflicts.
fn merge_fragment(target: &mut Value, fragment: &Value, path: &str) -> Result<(), SpecError> {
    match (target, fragment) {
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                let child_path = if path.is_empty() { key.clone() } else { format!("{}.{}", path, key) };
                match into.get_mut(key) {
                    None => {
                        into.insert(key.clone(), value.clone());
                    }
                    Some(Value::Array(existing)) if key == "required" => {
                        let extra = value.as_array().ok_or_else(|| SpecError::InvalidSchema {
                            path: child_path.clone(),
                            reason: "required must be an array".to_string(),
                        })?;
                        for name in extra {
                            if !existing.contains(name) {
                                existing.push(name.clone());
                            }
                        }
                    }
                    Some(existing) => merge_fragment(existing, value, &child_path)?,
                }
            }
            Ok(())
        }
        (target, fragment) if *target == *fragment => Ok(()),
        _ => Err(SpecError::SchemaConflict { path: if path.is_empty() { "<root>".to_string() } else { path.to_string() } }),
    }
}

fn resolve_identity(model: &str, schema: &PropertySchema, fallback: &str) -> Result<String, SpecError> {
    let mut flagged = schema.properties.iter().filter(|(_, p)| p.meta.id).map(|(n, _)| n.clone());
    match (flagged.next(), flagged.next()) {
        (Some(_), Some(_)) => Err(SpecError::MultipleIdentities(model.to_string())),
        (Some(name), None) => Ok(name),
        (None, _) => Ok(fallback.to_string()),
    }
}

fn derive_indexes(path: &str, prop: &PropertySchema, indexes: &mut Vec<IndexSpec>) {
    if prop.meta.index || prop.meta.unique {
        indexes.push(IndexSpec::single(path, prop.meta.unique));
    }
    for (name, child) in &prop.properties {
        derive_indexes(&format!("{}.{}", path, name), child, indexes);
    }
}

/// One index per name; a unique declaration wins over a plain one
fn dedupe_indexes(indexes: Vec<IndexSpec>) -> Vec<IndexSpec> {
    let mut out: Vec<IndexSpec> = Vec::new();
    for index in indexes {
        match out.iter_mut().find(|i| i.name == index.name) {
            Some(existing) => existing.unique |= index.unique,
            None => out.push(index),
        }
    }
    out
}
