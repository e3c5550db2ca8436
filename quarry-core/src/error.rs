//! Error taxonomy for the document engine
//!
//! Every pipeline stage propagates the first error it meets. The store only
//! reshapes storage failures (duplicate keys) into [`QuarryError::Validation`];
//! it never swallows an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine result type
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Main error type of the engine
#[derive(thiserror::Error, Debug)]
pub enum QuarryError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{model} not found: {selector}")]
    Missing { model: String, selector: String },
    /// The update produced no difference with the stored document
    #[error("Document unchanged")]
    Unchanged,
    #[error("Access denied: {0}")]
    Access(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Spec(#[from] SpecError),
}

impl QuarryError {
    pub fn missing(model: impl Into<String>, selector: impl fmt::Display) -> Self {
        Self::Missing { model: model.into(), selector: selector.to_string() }
    }

    /// Single-field validation failure
    pub fn invalid(
        field: impl Into<String>,
        kind: ValidationKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation(ValidationErrors::single(FieldError::new(field, kind, message)))
    }

    /// Unchanged is a no-op signal rather than a failure
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// HTTP status the routing collaborator should answer with
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 422,
            Self::Missing { .. } => 404,
            Self::Unchanged => 204,
            Self::Access(_) => 401,
            Self::Storage(_) | Self::Spec(_) => 500,
        }
    }
}

/// Category of a field-level validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationKind {
    Schema,
    Required,
    Unique,
    Relationship,
    Cascade,
    Immutable,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schema => "schema",
            Self::Required => "required",
            Self::Unique => "unique",
            Self::Relationship => "relationship",
            Self::Cascade => "cascade",
            Self::Immutable => "immutable",
        };
        f.write_str(name)
    }
}

/// One field-level validation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field, absent for document-level failures
    pub field: Option<String>,
    pub kind: ValidationKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: ValidationKind, message: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            field: if field.is_empty() { None } else { Some(field) },
            kind,
            message: message.into(),
        }
    }
}

/// Non-empty list of validation failures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn single(error: FieldError) -> Self {
        Self(vec![error])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// First error reported for `field`
    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.field.as_deref() == Some(field))
    }

    pub fn has_kind(&self, kind: ValidationKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| match &e.field {
                Some(field) => format!("{}: {}", field, e.message),
                None => e.message.clone(),
            })
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Failures reported by the storage collaborator
#[derive(thiserror::Error, Debug, Clone)]
pub enum StorageError {
    #[error("Duplicate key in {collection} for index {index}")]
    DuplicateKey { collection: String, index: String },
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Failures while composing a model spec
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("Conflicting schema definitions at {path}")]
    SchemaConflict { path: String },
    #[error("Invalid schema at {path}: {reason}")]
    InvalidSchema { path: String, reason: String },
    #[error("Model {0} declares more than one identity property")]
    MultipleIdentities(String),
    #[error("Callback {callback} cannot run at stage {stage} of {family}")]
    InvalidStage { callback: String, stage: String, family: String },
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),
    #[error("Storage of tenant {tenant} assigns identifiers under {found}, configured identity field is {expected}")]
    IdentityField { tenant: String, expected: String, found: String },
}

/// Uniform error body handed to the HTTP collaborator
/// {
///   "status": 422,
///   "errors": [{ "type": "unique", "message": "...", "field": "slug" }]
/// }
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&QuarryError> for ErrorResponse {
    fn from(err: &QuarryError) -> Self {
        let item = |kind: &str, message: String| ErrorItem { kind: kind.to_string(), message, field: None };
        let errors = match err {
            QuarryError::Validation(errors) => errors
                .iter()
                .map(|e| ErrorItem {
                    kind: e.kind.to_string(),
                    message: e.message.clone(),
                    field: e.field.clone(),
                })
                .collect(),
            QuarryError::Missing { .. } => vec![item("missing", err.to_string())],
            QuarryError::Unchanged => vec![item("unchanged", err.to_string())],
            QuarryError::Access(_) => vec![item("access", err.to_string())],
            QuarryError::Storage(_) | QuarryError::Spec(_) => {
                log::error!("Internal failure surfaced to caller: {}", err);
                vec![item("internal", "Internal server error".to_string())]
            }
        };
        Self { status: err.status(), errors }
    }
}
