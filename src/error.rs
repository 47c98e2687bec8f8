//! Error types for the data store core
//!
//! Every failure is returned as a typed value to the immediate caller. The core
//! never retries and never commits a partially validated entity.

use thiserror::Error;

use crate::schema::ValidationFailure;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Data store error types
#[derive(Error, Debug)]
pub enum Error {
    /// Entity, alias, schema or moniker payload does not exist
    #[error("{what} not found: {key}")]
    NotFound {
        /// Kind of thing that was looked up (e.g. "schema", "alias", "Step")
        what: String,
        /// Identifier or name that was looked up
        key: String,
    },

    /// Duplicate alias name, or duplicate schema id with different content
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A reference field points to a missing or wrong-kind entity
    #[error("Dangling reference in `{field}`: {target}\nCreate the referenced entity first, or check the id/alias")]
    DanglingReference {
        /// Reference field name (e.g. `parent_step_id`)
        field: String,
        /// Id or alias that failed to resolve, with the reason
        target: String,
    },

    /// Extensions violate the effective schema
    #[error("Schema validation failed: {0}")]
    Validation(ValidationFailure),

    /// Value or field type does not match what the caller expected
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Malformed filter expression or query option
    #[error("Query parse error: {0}")]
    ParseError(String),

    /// Deadline elapsed before the operation could commit
    #[error("Operation timed out: {0}\nNothing was committed")]
    Timeout(String),

    /// Payload encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub(crate) fn not_found(what: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            key: key.into(),
        }
    }

    pub(crate) fn dangling(field: impl Into<String>, target: impl Into<String>) -> Self {
        Self::DanglingReference {
            field: field.into(),
            target: target.into(),
        }
    }

    pub(crate) fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
