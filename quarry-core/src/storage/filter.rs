//! Filter predicate language
//!
//! Filters are JSON objects in the Mongo style:
//!
//! ```json
//! { "author": "a1", "rank": { "$gte": 3 }, "$or": [{ "status": "live" }, { "pinned": true }] }
//! ```
//!
//! Supported: equality (an array field matches when it contains the value),
//! `$eq`, `$ne`, `$in`, `$nin`, `$exists`, `$gt`, `$gte`, `$lt`, `$lte`,
//! `$or`, `$and`, and dotted paths into nested objects.

use crate::document::Document;
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::StorageResult;

/// A storage predicate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Map<String, Value>);

impl Filter {
    /// Match-everything filter
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StorageError::InvalidFilter(format!("filter must be an object, got {}", other))),
        }
    }

    /// Add a raw condition for `field`
    pub fn with(mut self, field: impl Into<String>, condition: Value) -> Self {
        self.0.insert(field.into(), condition);
        self
    }

    /// Add an equality condition
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, value.into())
    }

    /// Add a set-membership condition
    pub fn is_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        let mut op = Map::new();
        op.insert("$in".to_string(), Value::Array(values));
        self.with(field, Value::Object(op))
    }

    /// Require `field` to be present and not null
    pub fn present(self, field: impl Into<String>) -> Self {
        let mut op = Map::new();
        op.insert("$exists".to_string(), Value::Bool(true));
        op.insert("$ne".to_string(), Value::Null);
        self.with(field, Value::Object(op))
    }

    /// Match when any of `filters` matches
    pub fn or(filters: Vec<Filter>) -> Self {
        let mut map = Map::new();
        map.insert("$or".to_string(), Value::Array(filters.into_iter().map(Filter::into_value).collect()));
        Self(map)
    }

    /// Conjunction of both filters
    pub fn and(mut self, other: Filter) -> Self {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        if other.0.keys().all(|k| !self.0.contains_key(k)) {
            self.0.extend(other.0);
            return self;
        }
        let mut map = Map::new();
        map.insert("$and".to_string(), Value::Array(vec![self.into_value(), other.into_value()]));
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Condition set on `field`, if any
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Evaluate the predicate against a document
    pub fn matches(&self, doc: &Document) -> StorageResult<bool> {
        matches_map(&self.0, doc)
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn matches_map(conditions: &Map<String, Value>, doc: &Document) -> StorageResult<bool> {
    for (key, condition) in conditions {
        let ok = match key.as_str() {
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches_map(sub, doc)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches_map(sub, doc)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            op if op.starts_with('$') => {
                return Err(StorageError::InvalidFilter(format!("unknown top-level operator {}", op)));
            }
            field => matches_condition(doc.get_path(field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, value: &'a Value) -> StorageResult<Vec<&'a Map<String, Value>>> {
    let items = value
        .as_array()
        .ok_or_else(|| StorageError::InvalidFilter(format!("{} expects an array", op)))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StorageError::InvalidFilter(format!("{} entries must be objects", op)))
        })
        .collect()
}

fn is_operator_object(condition: &Value) -> bool {
    match condition {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn matches_condition(field: Option<&Value>, condition: &Value) -> StorageResult<bool> {
    if !is_operator_object(condition) {
        return Ok(equals(field, condition));
    }
    let Value::Object(ops) = condition else {
        return Ok(false);
    };
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(field, operand),
            "$ne" => !equals(field, operand),
            "$in" => in_list(field, op, operand)?,
            "$nin" => !in_list(field, op, operand)?,
            "$exists" => {
                let wanted = operand
                    .as_bool()
                    .ok_or_else(|| StorageError::InvalidFilter("$exists expects a boolean".to_string()))?;
                field.is_some() == wanted
            }
            "$gt" => compares(field, operand, |o| o == Ordering::Greater),
            "$gte" => compares(field, operand, |o| o != Ordering::Less),
            "$lt" => compares(field, operand, |o| o == Ordering::Less),
            "$lte" => compares(field, operand, |o| o != Ordering::Greater),
            other => return Err(StorageError::InvalidFilter(format!("unknown operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(field: Option<&Value>, op: &str, operand: &Value) -> StorageResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| StorageError::InvalidFilter(format!("{} expects an array", op)))?;
    Ok(candidates.iter().any(|c| equals(field, c)))
}

/// Equality with array-contains semantics; a missing field equals null
fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.iter().any(|item| same(item, expected)),
        Some(value) => same(value, expected),
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Comparisons only hold between values of the same type class
fn compares(field: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| rank(value) == rank(operand) && accept(compare_values(value, operand));
    match field {
        None => false,
        Some(Value::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values used for sorting and range comparisons.
///
/// Values of different types order by type class (null, numbers, strings,
/// objects, arrays, booleans); RFC 3339 timestamps order correctly as strings.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(value: Value) -> Filter {
        Filter::from_value(value).unwrap()
    }

    #[test]
    fn test_equality_and_array_contains() {
        let doc = crate::doc!({ "author": "a1", "tags": ["rust", "db"], "meta": { "lang": "en" } });

        assert!(filter(json!({ "author": "a1" })).matches(&doc).unwrap());
        assert!(filter(json!({ "tags": "db" })).matches(&doc).unwrap());
        assert!(filter(json!({ "meta.lang": "en" })).matches(&doc).unwrap());
        assert!(!filter(json!({ "author": "a2" })).matches(&doc).unwrap());
        assert!(filter(json!({ "missing": null })).matches(&doc).unwrap());
    }

    #[test]
    fn test_operators() {
        let doc = crate::doc!({ "rank": 3, "publishedVersion": null, "createdAt": "2024-05-01T00:00:00.000Z" });

        assert!(filter(json!({ "rank": { "$gte": 3, "$lt": 4 } })).matches(&doc).unwrap());
        assert!(filter(json!({ "rank": { "$in": [1, 3.0] } })).matches(&doc).unwrap());
        assert!(filter(json!({ "rank": { "$nin": [1, 2] } })).matches(&doc).unwrap());
        assert!(!filter(json!({ "rank": { "$gt": "2" } })).matches(&doc).unwrap());
        assert!(filter(json!({ "publishedVersion": { "$exists": true } })).matches(&doc).unwrap());
        assert!(!Filter::new().present("publishedVersion").matches(&doc).unwrap());
        assert!(filter(json!({ "createdAt": { "$lt": "2025-01-01T00:00:00.000Z" } })).matches(&doc).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let doc = crate::doc!({ "status": "draft", "pinned": true });
        let either = Filter::or(vec![Filter::new().eq("status", "live"), Filter::new().eq("pinned", true)]);
        assert!(either.matches(&doc).unwrap());

        let both = Filter::new().eq("status", "live").and(Filter::new().eq("status", "draft"));
        assert!(both.get("$and").is_some());
        assert!(!both.matches(&doc).unwrap());
    }

    #[test]
    fn test_invalid_filters() {
        let doc = crate::doc!({ "rank": 1 });
        assert!(filter(json!({ "rank": { "$near": 1 } })).matches(&doc).is_err());
        assert!(filter(json!({ "rank": { "$in": 1 } })).matches(&doc).is_err());
        assert!(filter(json!({ "$where": "x" })).matches(&doc).is_err());
        assert!(Filter::from_value(json!([1])).is_err());
    }

    #[test]
    fn test_compare_values_orders_types() {
        assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!(1.0)), Ordering::Equal);
    }
}
