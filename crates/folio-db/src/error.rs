//! Error types for the record and highlight model.

use thiserror::Error;

/// Errors that can occur when building or patching records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("Highlight not found: {0}")]
    HighlightNotFound(String),

    #[error("Highlight {id} is missing field `{field}`")]
    IncompleteHighlight { id: String, field: &'static str },

    #[error("Invalid highlight attribute: {0}")]
    InvalidAttribute(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
