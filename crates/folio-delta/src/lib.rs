//! Folio Delta - rich-text deltas and the operational-transform algebra
//!
//! A [`Delta`] is an ordered sequence of [`Op`]s (`Insert`, `Retain`,
//! `Delete`). The same type describes a whole document (inserts only) and a
//! change to a document.
//!
//! All functions here are pure: no I/O, no shared state.
//!
//! # Example
//!
//! ```rust
//! use folio_delta::Delta;
//!
//! let document = Delta::from_text("Hello\n");
//!
//! let mut ours = Delta::new();
//! ours.retain(5).insert(" World");
//! let mut theirs = Delta::new();
//! theirs.insert("Hi ");
//!
//! // Rebase our edit over theirs; theirs wins ties.
//! let rebased = theirs.transform(&ours, true);
//! let merged = document.compose(&theirs).compose(&rebased);
//! assert_eq!(merged.text(), "Hi Hello World\n");
//! ```

pub mod attributes;
pub mod delta;
pub mod error;
pub mod iter;
pub mod op;
pub mod range;

pub use attributes::AttributeMap;
pub use delta::Delta;
pub use error::{DeltaError, Result};
pub use iter::OpIter;
pub use op::{Op, OpKind};
pub use range::TextRange;
