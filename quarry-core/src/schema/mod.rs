//! Model schemas: typed property tree, relationship metadata, validation and composition

pub mod compose;
pub mod property;
pub mod relations;
pub mod validation;

pub use compose::{compose, Feature, ModelDefinition, ModelSpec};
pub use property::{PropertyMeta, PropertySchema, PropertyType, SlugSource, META_KEY};
pub use relations::{
    mirror_entry, reference_id, references, Cardinality, OnDelete, Reference, ReferenceDiff, Relationship,
};
pub use validation::{validate_document, validate_value};
