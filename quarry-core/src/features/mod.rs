//! Built-in features
//!
//! A feature is a named fragment of schema, callbacks and indexes that the
//! composer mixes into a model. Each module exposes a `NAME` and a
//! `feature()` constructor.

pub mod audit;
pub mod changelog;
pub mod published;
pub mod relationships;
pub mod search;
pub mod sequence;
pub mod slug;
pub mod translations;

use crate::schema::{Feature, PropertySchema};

/// Features registered in every new registry
pub fn builtin() -> Vec<Feature> {
    vec![
        audit::feature(),
        changelog::feature(None),
        published::feature(None),
        relationships::feature(),
        sequence::feature(),
        slug::feature(),
        translations::feature(),
    ]
}

/// Features required by the metadata a schema declares
pub fn implied_by(schema: &PropertySchema) -> Vec<&'static str> {
    let mut implied = Vec::new();
    let metas = || schema.properties.iter().map(|(_, p)| &p.meta);
    if metas().any(|m| m.relationship.is_some()) {
        implied.push(relationships::NAME);
    }
    if metas().any(|m| m.sequence) {
        implied.push(sequence::NAME);
    }
    if metas().any(|m| m.slug.is_some()) {
        implied.push(slug::NAME);
    }
    if metas().any(|m| m.translated) {
        implied.push(translations::NAME);
    }
    implied
}

/// Current time as an RFC 3339 string with millisecond precision
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
