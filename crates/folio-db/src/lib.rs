//! # folio-db
//!
//! Persistent data model of the Folio sync engine.
//!
//! This crate provides:
//! - Delta log records, editor and record identifiers, server timestamps
//! - Compaction snapshots
//! - Highlight records and the `highlight` text attribute
//! - Span scanning and the three-way highlight reconcile plan
//!
//! Nothing here performs I/O; the stores and the tasks that drive them live
//! in `folio-sdk`.
//!
//! ## Example
//!
//! ```rust
//! use folio_db::{plan, scan_highlights, HighlightAttr, HighlightId, TagId};
//! use folio_delta::Delta;
//! use std::collections::BTreeMap;
//!
//! let attr = HighlightAttr::new(HighlightId::new("h1"), TagId::new("T1"));
//! let mut tag = Delta::new();
//! tag.retain(1).retain_with(4, attr.to_attributes().unwrap());
//! let doc = tag.apply_to(&Delta::from_text("Hello\n")).unwrap();
//!
//! let writes = plan("doc-1", &BTreeMap::new(), &scan_highlights(&doc), 0);
//! assert_eq!(writes.created[0].text, "ello");
//! ```

pub mod error;
pub mod highlight;
pub mod reconcile;
pub mod record;
pub mod spans;

// Record exports
pub use record::{DeltaRecord, DocumentSnapshot, EditorId, RecordId, ServerTimestamp};

// Highlight exports
pub use highlight::{
    Highlight, HighlightAttr, HighlightFields, HighlightId, TagId, HIGHLIGHT_ATTRIBUTE,
};
pub use reconcile::{diff, plan, ReconcilePlan};
pub use spans::{scan_highlights, HighlightSpan};

// Error exports
pub use error::{DbError, Result};
