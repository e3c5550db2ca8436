//! Structural JSON diff
//!
//! Each differing leaf path is classified as added, deleted, changed, or
//! type-changed. The store uses it to detect no-op updates and the changelog
//! records it.

use crate::document::Document;
use crate::schema::PropertyType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One differing path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChangeKind {
    Added { value: Value },
    Deleted { value: Value },
    Changed { from: Value, to: Value },
    TypeChanged { from_type: String, to_type: String, from: Value, to: Value },
}

/// Diff two JSON values
pub fn diff(old: &Value, new: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    walk(old, new, "", &mut changes);
    changes
}

/// Diff two documents, ignoring the top-level `ignore` fields
pub fn diff_documents(old: &Document, new: &Document, ignore: &[&str]) -> Vec<Change> {
    let mut changes = Vec::new();
    for (key, before) in old.iter() {
        if ignore.contains(&key.as_str()) {
            continue;
        }
        match new.get(key) {
            Some(after) => walk(before, after, key, &mut changes),
            None => changes.push(Change { path: key.clone(), kind: ChangeKind::Deleted { value: before.clone() } }),
        }
    }
    for (key, after) in new.iter() {
        if !ignore.contains(&key.as_str()) && !old.contains(key) {
            changes.push(Change { path: key.clone(), kind: ChangeKind::Added { value: after.clone() } });
        }
    }
    changes
}

fn walk(old: &Value, new: &Value, path: &str, changes: &mut Vec<Change>) {
    match (old, new) {
        (Value::Object(before), Value::Object(after)) => {
            for (key, value) in before {
                let child = join(path, key);
                match after.get(key) {
                    Some(next) => walk(value, next, &child, changes),
                    None => changes.push(Change { path: child, kind: ChangeKind::Deleted { value: value.clone() } }),
                }
            }
            for (key, value) in after {
                if !before.contains_key(key) {
                    changes.push(Change { path: join(path, key), kind: ChangeKind::Added { value: value.clone() } });
                }
            }
        }
        (Value::Array(before), Value::Array(after)) => {
            for (i, value) in before.iter().enumerate() {
                let child = join(path, &i.to_string());
                match after.get(i) {
                    Some(next) => walk(value, next, &child, changes),
                    None => changes.push(Change { path: child, kind: ChangeKind::Deleted { value: value.clone() } }),
                }
            }
            for (i, value) in after.iter().enumerate().skip(before.len()) {
                changes.push(Change { path: join(path, &i.to_string()), kind: ChangeKind::Added { value: value.clone() } });
            }
        }
        (Value::Number(a), Value::Number(b)) if a.as_f64() == b.as_f64() => {}
        _ if old == new => {}
        _ => {
            let (from_type, to_type) = (type_class(old), type_class(new));
            let kind = if from_type == to_type {
                ChangeKind::Changed { from: old.clone(), to: new.clone() }
            } else {
                ChangeKind::TypeChanged {
                    from_type: from_type.to_string(),
                    to_type: to_type.to_string(),
                    from: old.clone(),
                    to: new.clone(),
                }
            };
            changes.push(Change { path: path.to_string(), kind });
        }
    }
}

fn type_class(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "number",
        other => PropertyType::of(other),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
