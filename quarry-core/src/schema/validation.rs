//! Document validation against a composed schema

use crate::document::Document;
use crate::error::{FieldError, ValidationErrors, ValidationKind};
use crate::schema::property::{PropertySchema, PropertyType};
use serde_json::{Map, Value};

/// Validate a document against the model's root schema.
///
/// `reserved` names fields the storage layer owns (the store-assigned
/// identifier); they never count as unknown properties.
pub fn validate_document(schema: &PropertySchema, doc: &Document, reserved: &[&str]) -> ValidationErrors {
    let mut errors = Vec::new();
    validate_object(schema, doc.as_map(), "", reserved, &mut errors);
    ValidationErrors(errors)
}

/// Validate a single value; returns the collected errors
pub fn validate_value(schema: &PropertySchema, value: &Value, path: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_value(schema, value, path, &mut errors);
    errors
}

fn validate_object(
    schema: &PropertySchema,
    map: &Map<String, Value>,
    path: &str,
    reserved: &[&str],
    errors: &mut Vec<FieldError>,
) {
    for name in &schema.required {
        if map.get(name).map_or(true, Value::is_null) {
            errors.push(FieldError::new(join(path, name), ValidationKind::Required, "is required"));
        }
    }

    for (name, child) in &schema.properties {
        if let Some(value) = map.get(name) {
            if value.is_null() && schema.is_required(name) {
                continue;
            }
            check_value(child, value, &join(path, name), errors);
        }
    }

    if !schema.additional_properties {
        for key in map.keys() {
            if schema.property(key).is_none() && !reserved.contains(&key.as_str()) {
                errors.push(FieldError::new(
                    join(path, key),
                    ValidationKind::Schema,
                    "is not an allowed property",
                ));
            }
        }
    }
}

fn check_value(schema: &PropertySchema, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    if schema.meta.translated {
        check_translations(schema, value, path, errors);
        return;
    }

    if !schema.types.is_empty() && !schema.types.iter().any(|t| t.matches(value)) {
        let expected: Vec<_> = schema.types.iter().map(|t| t.name()).collect();
        errors.push(FieldError::new(
            path,
            ValidationKind::Schema,
            format!("expected {}, got {}", expected.join(" or "), PropertyType::of(value)),
        ));
        return;
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.contains(value) {
            errors.push(FieldError::new(path, ValidationKind::Schema, "is not one of the allowed values"));
        }
    }

    match value {
        Value::String(s) => check_string(schema, s, path, errors),
        Value::Number(n) => {
            if let Some(number) = n.as_f64() {
                if let Some(min) = schema.minimum {
                    if number < min {
                        errors.push(FieldError::new(path, ValidationKind::Schema, format!("must be >= {}", min)));
                    }
                }
                if let Some(max) = schema.maximum {
                    if number > max {
                        errors.push(FieldError::new(path, ValidationKind::Schema, format!("must be <= {}", max)));
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.min_items {
                if items.len() < min {
                    errors.push(FieldError::new(
                        path,
                        ValidationKind::Schema,
                        format!("must contain at least {} items", min),
                    ));
                }
            }
            if let Some(max) = schema.max_items {
                if items.len() > max {
                    errors.push(FieldError::new(
                        path,
                        ValidationKind::Schema,
                        format!("must contain at most {} items", max),
                    ));
                }
            }
            if let Some(item_schema) = &schema.items {
                for (i, item) in items.iter().enumerate() {
                    check_value(item_schema, item, &format!("{}.{}", path, i), errors);
                }
            }
        }
        Value::Object(map) => {
            if !schema.properties.is_empty() || !schema.required.is_empty() || !schema.additional_properties {
                validate_object(schema, map, path, &[], errors);
            }
        }
        _ => {}
    }
}

fn check_string(schema: &PropertySchema, s: &str, path: &str, errors: &mut Vec<FieldError>) {
    let len = s.chars().count();
    if let Some(min) = schema.min_length {
        if len < min {
            errors.push(FieldError::new(
                path,
                ValidationKind::Schema,
                format!("must be at least {} characters", min),
            ));
        }
    }
    if let Some(max) = schema.max_length {
        if len > max {
            errors.push(FieldError::new(
                path,
                ValidationKind::Schema,
                format!("must be at most {} characters", max),
            ));
        }
    }
    match schema.format.as_deref() {
        Some("date-time") if chrono::DateTime::parse_from_rfc3339(s).is_err() => {
            errors.push(FieldError::new(path, ValidationKind::Schema, "must be an RFC 3339 date-time"));
        }
        Some("email") if !looks_like_email(s) => {
            errors.push(FieldError::new(path, ValidationKind::Schema, "must be an email address"));
        }
        _ => {}
    }
}

fn check_translations(schema: &PropertySchema, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(by_language) = value.as_object() else {
        errors.push(FieldError::new(path, ValidationKind::Schema, "must be an object keyed by language"));
        return;
    };
    let mut plain = schema.clone();
    plain.meta.translated = false;
    for (lang, translated) in by_language {
        check_value(&plain, translated, &join(path, lang), errors);
    }
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}
