//! Typed schema tree
//!
//! Model schemas arrive as JSON Schema documents where each property may carry
//! an `x-meta` object with engine annotations:
//!
//! ```json
//! {
//!   "type": "string",
//!   "x-meta": { "unique": true, "versioned": false }
//! }
//! ```
//!
//! Parsing turns the loose JSON into [`PropertySchema`] values and rejects
//! metadata combinations that cannot work (a to-many relationship on a scalar,
//! a sequence on a string...) before any request runs.

use crate::error::SpecError;
use crate::schema::relations::Relationship;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding engine annotations inside a property schema
pub const META_KEY: &str = "x-meta";

/// JSON types a property may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

impl PropertyType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        }
    }

    /// Whether a JSON value satisfies this type
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Null => value.is_null(),
        }
    }

    /// JSON type name of a value
    pub fn of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Slug derivation source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlugSource {
    /// Property the slug is derived from
    pub from: String,
}

/// Engine annotations carried by a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PropertyMeta {
    /// Callers may set the property (callbacks always can)
    pub writable: bool,
    /// Property is returned to callers
    pub readable: bool,
    /// Property is captured in version snapshots
    pub versioned: bool,
    /// An index is maintained on the property
    pub index: bool,
    /// A unique index is maintained on the property
    pub unique: bool,
    /// Property is the model's identity
    pub id: bool,
    pub relationship: Option<Relationship>,
    /// Integer assigned from a per-collection counter on create
    pub sequence: bool,
    pub slug: Option<SlugSource>,
    /// Value is an object keyed by language code
    pub translated: bool,
}

impl Default for PropertyMeta {
    fn default() -> Self {
        Self {
            writable: true,
            readable: true,
            versioned: true,
            index: false,
            unique: false,
            id: false,
            relationship: None,
            sequence: false,
            slug: None,
            translated: false,
        }
    }
}

/// One node of the schema tree
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    /// Accepted types, empty means any
    pub types: Vec<PropertyType>,
    /// Declared child properties, in declaration order
    pub properties: Vec<(String, PropertySchema)>,
    pub required: Vec<String>,
    pub items: Option<Box<PropertySchema>>,
    pub enum_values: Option<Vec<Value>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub format: Option<String>,
    pub default: Option<Value>,
    pub additional_properties: bool,
    pub meta: PropertyMeta,
}

impl PropertySchema {
    /// An object schema without properties
    pub fn empty_object() -> Self {
        Self {
            types: vec![PropertyType::Object],
            properties: Vec::new(),
            required: Vec::new(),
            items: None,
            enum_values: None,
            min_length: None,
            max_length: None,
            min_items: None,
            max_items: None,
            minimum: None,
            maximum: None,
            format: None,
            default: None,
            additional_properties: true,
            meta: PropertyMeta::default(),
        }
    }

    /// Parse a JSON schema node; `path` is used in error messages
    pub fn parse(value: &Value, path: &str) -> Result<Self, SpecError> {
        let node = value.as_object().ok_or_else(|| invalid(path, "schema node must be an object"))?;

        let mut schema = Self::empty_object();
        schema.types = parse_types(node.get("type"), path)?;

        if let Some(props) = node.get("properties") {
            let props = props.as_object().ok_or_else(|| invalid(path, "properties must be an object"))?;
            for (name, child) in props {
                let child_path = join(path, name);
                schema.properties.push((name.clone(), Self::parse(child, &child_path)?));
            }
        }

        if let Some(required) = node.get("required") {
            let list = required.as_array().ok_or_else(|| invalid(path, "required must be an array"))?;
            for entry in list {
                let name = entry.as_str().ok_or_else(|| invalid(path, "required entries must be strings"))?;
                if !schema.required.iter().any(|r| r == name) {
                    schema.required.push(name.to_string());
                }
            }
        }

        if let Some(items) = node.get("items") {
            schema.items = Some(Box::new(Self::parse(items, &join(path, "items"))?));
        }

        if let Some(values) = node.get("enum") {
            let values = values.as_array().ok_or_else(|| invalid(path, "enum must be an array"))?;
            schema.enum_values = Some(values.clone());
        }

        schema.min_length = read_usize(node, "minLength", path)?;
        schema.max_length = read_usize(node, "maxLength", path)?;
        schema.min_items = read_usize(node, "minItems", path)?;
        schema.max_items = read_usize(node, "maxItems", path)?;
        schema.minimum = read_f64(node, "minimum", path)?;
        schema.maximum = read_f64(node, "maximum", path)?;
        schema.format = node.get("format").and_then(Value::as_str).map(str::to_string);
        schema.default = node.get("default").cloned();
        schema.additional_properties =
            node.get("additionalProperties").and_then(Value::as_bool).unwrap_or(true);

        if let Some(meta) = node.get(META_KEY) {
            schema.meta = serde_json::from_value(meta.clone())
                .map_err(|e| invalid(path, &format!("invalid {}: {}", META_KEY, e)))?;
        }

        schema.check_meta(path)?;
        Ok(schema)
    }

    /// Reject metadata combinations the engine cannot honor
    fn check_meta(&self, path: &str) -> Result<(), SpecError> {
        let meta = &self.meta;

        if let Some(rel) = &meta.relationship {
            if meta.id {
                return Err(invalid(path, "identity property cannot be a relationship"));
            }
            if meta.translated {
                return Err(invalid(path, "relationship property cannot be translated"));
            }
            if rel.cardinality.is_to_many() && !self.accepts(PropertyType::Array) {
                return Err(invalid(path, "to-many relationship must be array-typed"));
            }
            if !rel.cardinality.is_to_many() && self.is_array_only() {
                return Err(invalid(path, "to-one relationship cannot be array-typed"));
            }
        }

        if meta.sequence && !self.accepts(PropertyType::Integer) {
            return Err(invalid(path, "sequence property must be an integer"));
        }

        if meta.slug.is_some() && !self.accepts(PropertyType::String) {
            return Err(invalid(path, "slug property must be a string"));
        }

        if meta.id && !meta.readable {
            return Err(invalid(path, "identity property must be readable"));
        }

        Ok(())
    }

    /// Child property by name
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Whether the type list admits `kind` (an empty list admits everything)
    pub fn accepts(&self, kind: PropertyType) -> bool {
        self.types.is_empty()
            || self.types.contains(&kind)
            || (kind == PropertyType::Integer && self.types.contains(&PropertyType::Number))
    }

    /// Array is the only non-null type
    pub fn is_array_only(&self) -> bool {
        let non_null: Vec<_> = self.types.iter().filter(|t| **t != PropertyType::Null).collect();
        non_null.len() == 1 && *non_null[0] == PropertyType::Array
    }
}

fn parse_types(value: Option<&Value>, path: &str) -> Result<Vec<PropertyType>, SpecError> {
    let parse_one = |name: &Value| {
        name.as_str()
            .and_then(PropertyType::parse)
            .ok_or_else(|| invalid(path, &format!("unknown type {}", name)))
    };
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(names)) => names.iter().map(parse_one).collect(),
        Some(name) => Ok(vec![parse_one(name)?]),
    }
}

fn read_usize(node: &Map<String, Value>, key: &str, path: &str) -> Result<Option<usize>, SpecError> {
    match node.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| invalid(path, &format!("{} must be a non-negative integer", key))),
    }
}

fn read_f64(node: &Map<String, Value>, key: &str, path: &str) -> Result<Option<f64>, SpecError> {
    match node.get(key) {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| invalid(path, &format!("{} must be a number", key))),
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn invalid(path: &str, reason: &str) -> SpecError {
    SpecError::InvalidSchema {
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::relations::Cardinality;
    use serde_json::json;

    #[test]
    fn test_parse_properties_in_declaration_order() {
        let schema = PropertySchema::parse(
            &json!({
                "type": "object",
                "required": ["title", "title"],
                "properties": {
                    "title": { "type": "string", "maxLength": 10 },
                    "body": { "type": ["string", "null"] },
                    "rank": { "type": "integer", "x-meta": { "index": true } }
                }
            }),
            "",
        )
        .unwrap();

        let names: Vec<_> = schema.properties.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["title", "body", "rank"]);
        assert_eq!(schema.required, vec!["title"]);
        assert_eq!(schema.property("title").unwrap().max_length, Some(10));
        assert!(schema.property("rank").unwrap().meta.index);
        assert!(schema.property("body").unwrap().meta.versioned);
    }

    #[test]
    fn test_parse_relationship_meta() {
        let schema = PropertySchema::parse(
            &json!({
                "type": "array",
                "items": { "type": "string" },
                "x-meta": {
                    "relationship": { "toType": "articles", "toField": "author", "type": "one-to-many" }
                }
            }),
            "articles",
        )
        .unwrap();

        let rel = schema.meta.relationship.unwrap();
        assert_eq!(rel.to_type, "articles");
        assert_eq!(rel.cardinality, Cardinality::OneToMany);
        assert!(rel.is_two_way());
    }

    #[test]
    fn test_rejects_to_many_on_scalar() {
        let err = PropertySchema::parse(
            &json!({
                "type": "string",
                "x-meta": { "relationship": { "toType": "tags", "type": "many-to-many" } }
            }),
            "tags",
        )
        .unwrap_err();

        assert!(matches!(err, SpecError::InvalidSchema { ref path, .. } if path == "tags"));
    }

    #[test]
    fn test_rejects_unknown_meta_keys() {
        let err = PropertySchema::parse(&json!({ "type": "string", "x-meta": { "uniq": true } }), "slug");
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_string_sequence() {
        let err = PropertySchema::parse(&json!({ "type": "string", "x-meta": { "sequence": true } }), "n");
        assert!(err.is_err());
    }
}
