//! Error types for the Folio SDK.

use folio_db::{DbError, RecordId, ServerTimestamp};
use folio_delta::DeltaError;
use thiserror::Error;

/// Failure talking to the delta log or the highlight store.
///
/// These are transient: the caller retries on its next tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store closed")]
    Closed,
}

/// Error type for SDK operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    /// A delta did not fit the document it was applied to. Merging stops
    /// rather than desynchronising the replica.
    #[error("Protocol error: {0}")]
    Protocol(#[from] DeltaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    /// A record was based before the oldest applied record this replica
    /// keeps, so it cannot be rebased locally.
    #[error("Record {record_id} is based at {base}, below retained history at {floor}")]
    HistoryTruncated {
        record_id: RecordId,
        base: ServerTimestamp,
        floor: ServerTimestamp,
    },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Session closed")]
    SessionClosed,
}

impl SdkError {
    pub fn is_protocol(&self) -> bool {
        matches!(self, SdkError::Protocol(_))
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
