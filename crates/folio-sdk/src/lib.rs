//! Folio SDK - client side of the Folio collaborative text sync engine
//!
//! Every document is a rich-text delta shared through an append-only delta
//! log. Each client keeps a local replica, flushes its edits to the log as
//! records, merges everyone else's records as they arrive, and keeps the
//! document's highlight records in line with the highlight spans in the
//! text.
//!
//! # Quick Start
//!
//! ```rust
//! use folio_sdk::quick::create_collaborative_clients;
//! use folio_sdk::SyncConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> folio_sdk::Result<()> {
//! let (_backend, clients) = create_collaborative_clients(&["Alice", "Bob"], SyncConfig::default());
//!
//! let alice = clients[0].open_document("notes").await?;
//! let bob = clients[1].open_document("notes").await?;
//!
//! alice.insert_text(0, "Hello").await?;
//! alice.flush().await?;
//!
//! let mut contents = bob.watch_contents();
//! contents.wait_for(|doc| doc.text() == "Hello\n").await.ok();
//! assert_eq!(bob.text().await?, "Hello\n");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`store`] - the delta log and highlight store traits, with in-memory fakes
//! - [`document`] - the local document replica
//! - [`buffer`] - local edits not yet confirmed by the log
//! - [`history`] - applied records, for rebasing concurrent ones
//! - [`sync`] - the flush and pull protocol
//! - [`reconciler`] - highlight reconciliation
//! - [`session`] - the background tasks driving one open document
//! - [`client`] - entry point opening documents against a backend
//! - [`compaction`] - folding the log into snapshots
//! - [`error`] - Error types

pub mod buffer;
pub mod client;
pub mod compaction;
pub mod document;
pub mod error;
pub mod history;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use buffer::{FlushState, InFlight, LocalEditBuffer};
pub use client::{quick, Backend, Client, ClientConfig, ClientConfigBuilder, MemoryBackend};
pub use compaction::{compact, safe_point};
pub use document::{ChangeSource, DocEvent, DocumentReplica, RichTextDoc};
pub use error::{Result, SdkError, StoreError};
pub use history::{AppliedRecord, History, Rebased};
pub use reconciler::{HighlightReconciler, ReconcileOutcome};
pub use session::{DocumentSession, DocumentState};
pub use store::{
    HighlightStore, HighlightStream, MemoryDeltaLog, MemoryHighlightStore, RecordStream,
    RemoteDeltaLog,
};
pub use sync::{PullOutcome, SyncConfig, SyncConfigBuilder, SyncEvent, SyncManager};

// Re-export commonly used types from the lower crates
pub use folio_db::{
    DeltaRecord, DocumentSnapshot, EditorId, Highlight, HighlightFields, HighlightId, RecordId,
    ServerTimestamp, TagId,
};
pub use folio_delta::{AttributeMap, Delta, DeltaError, Op, TextRange};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Backend, Client, ClientConfig, MemoryBackend};
    pub use crate::document::{DocumentReplica, RichTextDoc};
    pub use crate::error::SdkError;
    pub use crate::session::DocumentSession;
    pub use crate::store::{HighlightStore, RemoteDeltaLog};
    pub use crate::sync::{SyncConfig, SyncEvent};
    pub use folio_db::{HighlightId, TagId};
    pub use folio_delta::{Delta, TextRange};
}
