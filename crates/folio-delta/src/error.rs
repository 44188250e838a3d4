//! Error types for the delta algebra.

use thiserror::Error;

/// Errors raised when a delta does not fit the document it is applied to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    #[error("Delta walks {base_length} characters but the document has {document_length}")]
    BaseLengthMismatch {
        base_length: usize,
        document_length: usize,
    },

    #[error("Expected a document (inserts only)")]
    NotADocument,
}

pub type Result<T> = std::result::Result<T, DeltaError>;
