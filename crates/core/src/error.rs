use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{EntityId, EntityKind};

/// What went wrong with a single input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// Required field absent on create.
    Missing,
    /// Value could not be coerced to the field's type.
    InvalidFormat,
    /// Value parsed but falls outside the permitted range.
    OutOfRange,
    /// Key is not part of the family's schema.
    UnknownField,
    /// Explicit `null` on a field that does not accept one.
    NotNullable,
}

/// A field-level validation failure. Create/update return a list of
/// these rather than stopping at the first offending field, so a
/// caller can fix a whole payload in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LabError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {kind} {id}")]
    NotFound { kind: EntityKind, id: EntityId },
    #[error("validation failed: {}", format_field_errors(.errors))]
    Validation { errors: Vec<FieldError> },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("cyclic reference: {0}")]
    CyclicReference(String),
    #[error("unknown variant `{value}` for {family}")]
    UnknownVariant { family: EntityKind, value: String },
    #[error("field `{field}` is not part of variant `{variant}`")]
    UnknownField { field: String, variant: String },
    #[error("field `{0}` is immutable after creation")]
    ImmutableField(String),
    #[error("no `{relation}` edge between {a} and {b}")]
    EdgeNotFound {
        relation: &'static str,
        a: EntityId,
        b: EntityId,
    },
    #[error("delete restricted: {0}")]
    RestrictedByReferences(String),
    #[error("insufficient inventory: requested {requested}, remaining {remaining}")]
    InsufficientInventory {
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("invalid amount: {0} (must be > 0)")]
    InvalidAmount(Decimal),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl LabError {
    /// Shorthand for a single-field validation failure.
    pub fn field(
        field: impl Into<String>,
        kind: FieldErrorKind,
        message: impl Into<String>,
    ) -> Self {
        LabError::Validation {
            errors: vec![FieldError::new(field, kind, message)],
        }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        LabError::Validation { errors }
    }

    pub fn not_found(kind: EntityKind, id: EntityId) -> Self {
        LabError::NotFound { kind, id }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<redb::DatabaseError> for LabError {
    fn from(e: redb::DatabaseError) -> Self {
        LabError::Storage(e.to_string())
    }
}
impl From<redb::TransactionError> for LabError {
    fn from(e: redb::TransactionError) -> Self {
        LabError::Storage(e.to_string())
    }
}
impl From<redb::TableError> for LabError {
    fn from(e: redb::TableError) -> Self {
        LabError::Storage(e.to_string())
    }
}
impl From<redb::StorageError> for LabError {
    fn from(e: redb::StorageError) -> Self {
        LabError::Storage(e.to_string())
    }
}
impl From<redb::CommitError> for LabError {
    fn from(e: redb::CommitError) -> Self {
        LabError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LabError>;
