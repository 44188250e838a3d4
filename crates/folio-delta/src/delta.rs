//! Deltas: normalized op sequences and the algebra over them.
//!
//! A delta either describes a whole document (inserts only) or a change to
//! one. A change keeps everything past its last op, so a change is valid for
//! any document at least as long as its [`Delta::base_length`].
//!
//! # Algebra
//!
//! ```text
//! compose(a, b)              apply a, then b
//! transform(a, b, priority)  b rewritten to apply after a
//! invert(a, base)            undo a on top of a(base)
//! transform_position(a, i)   where cursor i lands after a
//! ```
//!
//! Convergence:
//!
//! ```text
//! compose(a, transform(a, b, true)) ≡ compose(b, transform(b, a, false))
//! ```

use crate::attributes::{self, AttributeMap};
use crate::error::{DeltaError, Result};
use crate::iter::OpIter;
use crate::op::{Op, OpKind};
use serde::{Deserialize, Serialize};

/// A normalized sequence of ops.
///
/// Normalization (done by [`Delta::push`]): no zero-length ops, adjacent ops
/// of the same kind and attributes are merged, and an insert adjacent to a
/// delete is always placed first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Op>", into = "Vec<Op>")]
pub struct Delta {
    ops: Vec<Op>,
}

impl Delta {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// A document holding `text` with no formatting.
    pub fn from_text(text: &str) -> Self {
        let mut delta = Self::new();
        delta.insert(text);
        delta
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    // === Builders ===

    pub fn insert(&mut self, text: &str) -> &mut Self {
        self.push(Op::insert(text))
    }

    pub fn insert_with(&mut self, text: &str, attributes: AttributeMap) -> &mut Self {
        self.push(Op::insert_with(text, attributes))
    }

    pub fn retain(&mut self, length: usize) -> &mut Self {
        self.push(Op::retain(length))
    }

    pub fn retain_with(&mut self, length: usize, attributes: AttributeMap) -> &mut Self {
        self.push(Op::retain_with(length, attributes))
    }

    pub fn delete(&mut self, length: usize) -> &mut Self {
        self.push(Op::delete(length))
    }

    /// Append an op, keeping the delta normalized.
    pub fn push(&mut self, op: Op) -> &mut Self {
        if op.is_empty() {
            return self;
        }

        if let (Some(Op::Delete { length: last }), Op::Delete { length }) =
            (self.ops.last_mut(), &op)
        {
            *last += length;
            return self;
        }

        let mut index = self.ops.len();

        // Insert-before-delete keeps equivalent deltas identical.
        if op.is_insert() && matches!(self.ops.last(), Some(Op::Delete { .. })) {
            index -= 1;
            if index == 0 {
                self.ops.insert(0, op);
                return self;
            }
        }

        if index > 0 {
            match (&mut self.ops[index - 1], &op) {
                (
                    Op::Insert {
                        text: last_text,
                        attributes: last_attrs,
                    },
                    Op::Insert { text, attributes },
                ) if *last_attrs == *attributes => {
                    last_text.push_str(text);
                    return self;
                }
                (
                    Op::Retain {
                        length: last_len,
                        attributes: last_attrs,
                    },
                    Op::Retain { length, attributes },
                ) if *last_attrs == *attributes => {
                    *last_len += length;
                    return self;
                }
                _ => {}
            }
        }

        self.ops.insert(index, op);
        self
    }

    /// Drop a trailing plain retain, which is implied anyway.
    pub fn chop(mut self) -> Self {
        if let Some(Op::Retain { attributes, .. }) = self.ops.last() {
            if attributes.is_empty() {
                self.ops.pop();
            }
        }
        self
    }

    /// Append `other`'s ops, merging at the seam.
    pub fn concat(&self, other: &Delta) -> Delta {
        let mut delta = self.clone();
        for op in &other.ops {
            delta.push(op.clone());
        }
        delta
    }

    // === Measures ===

    /// Total length of all ops.
    pub fn length(&self) -> usize {
        self.ops.iter().map(Op::len).sum()
    }

    /// Characters of the base document this delta walks over (retain + delete).
    pub fn base_length(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| !op.is_insert())
            .map(Op::len)
            .sum()
    }

    /// Net change in document length (insert − delete).
    pub fn change_length(&self) -> isize {
        self.ops.iter().fold(0isize, |acc, op| match op {
            Op::Insert { .. } => acc + op.len() as isize,
            Op::Delete { length } => acc - *length as isize,
            Op::Retain { .. } => acc,
        })
    }

    /// True if every op is an insert.
    pub fn is_document(&self) -> bool {
        self.ops.iter().all(Op::is_insert)
    }

    /// Concatenated text of all inserts.
    pub fn text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Insert { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ops covering `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Delta {
        let mut delta = Delta::new();
        let mut iter = OpIter::new(&self.ops);
        let mut index = 0;

        while index < end && iter.has_next() {
            let op = if index < start {
                iter.next_len(start - index)
            } else {
                let op = iter.next_len(end - index);
                delta.push(op.clone());
                op
            };
            index += op.len();
        }

        delta
    }

    // === Algebra ===

    /// The delta equivalent to applying `self` and then `other`.
    pub fn compose(&self, other: &Delta) -> Delta {
        let mut this_iter = OpIter::new(&self.ops);
        let mut other_iter = OpIter::new(&other.ops);
        let mut delta = Delta::new();

        while this_iter.has_next() || other_iter.has_next() {
            if other_iter.peek_kind() == OpKind::Insert {
                delta.push(other_iter.next_op());
            } else if this_iter.peek_kind() == OpKind::Delete {
                delta.push(this_iter.next_op());
            } else {
                let length = this_iter.peek_length().min(other_iter.peek_length());
                let this_op = this_iter.next_len(length);
                let other_op = other_iter.next_len(length);

                match (this_op, other_op) {
                    (Op::Retain { attributes: a, .. }, Op::Retain { attributes: b, .. }) => {
                        delta.retain_with(length, attributes::compose(&a, &b, true));
                    }
                    (Op::Insert { text, attributes: a }, Op::Retain { attributes: b, .. }) => {
                        delta.insert_with(&text, attributes::compose(&a, &b, false));
                    }
                    (Op::Retain { .. }, Op::Delete { .. }) => {
                        delta.delete(length);
                    }
                    // An insert deleted by `other` never existed.
                    _ => {}
                }
            }
        }

        delta.chop()
    }

    /// Apply `self` to a document, checking it does not run past its end.
    pub fn apply_to(&self, document: &Delta) -> Result<Delta> {
        if !document.is_document() {
            return Err(DeltaError::NotADocument);
        }
        let document_length = document.length();
        let base_length = self.base_length();
        if base_length > document_length {
            return Err(DeltaError::BaseLengthMismatch {
                base_length,
                document_length,
            });
        }
        Ok(document.compose(self))
    }

    /// Rewrite `other` (concurrent with `self`, same base) to apply after `self`.
    ///
    /// `priority` decides insertions at the same index: `true` places `self`'s
    /// insert first.
    pub fn transform(&self, other: &Delta, priority: bool) -> Delta {
        let mut this_iter = OpIter::new(&self.ops);
        let mut other_iter = OpIter::new(&other.ops);
        let mut delta = Delta::new();

        while this_iter.has_next() || other_iter.has_next() {
            if this_iter.peek_kind() == OpKind::Insert
                && (priority || other_iter.peek_kind() != OpKind::Insert)
            {
                delta.retain(this_iter.next_op().len());
            } else if other_iter.peek_kind() == OpKind::Insert {
                delta.push(other_iter.next_op());
            } else {
                let length = this_iter.peek_length().min(other_iter.peek_length());
                let this_op = this_iter.next_len(length);
                let other_op = other_iter.next_len(length);

                if this_op.is_delete() {
                    // Already gone; nothing left for `other` to do here.
                    continue;
                }
                match other_op {
                    Op::Delete { .. } => {
                        delta.push(other_op);
                    }
                    Op::Retain { attributes, .. } => {
                        let this_attrs = this_op.attributes().cloned().unwrap_or_default();
                        delta.retain_with(
                            length,
                            attributes::transform(&this_attrs, &attributes, priority),
                        );
                    }
                    Op::Insert { .. } => {}
                }
            }
        }

        delta.chop()
    }

    /// The delta undoing `self` on the document `self.apply_to(base)` produced.
    pub fn invert(&self, base: &Delta) -> Result<Delta> {
        if !base.is_document() {
            return Err(DeltaError::NotADocument);
        }
        let document_length = base.length();
        let base_length = self.base_length();
        if base_length > document_length {
            return Err(DeltaError::BaseLengthMismatch {
                base_length,
                document_length,
            });
        }

        let mut inverted = Delta::new();
        let mut base_index = 0;

        for op in &self.ops {
            match op {
                Op::Insert { .. } => {
                    inverted.delete(op.len());
                }
                Op::Retain { length, attributes } if attributes.is_empty() => {
                    inverted.retain(*length);
                    base_index += length;
                }
                Op::Retain { length, attributes } => {
                    for base_op in base.slice(base_index, base_index + length).ops {
                        let base_attrs = base_op.attributes().cloned().unwrap_or_default();
                        inverted.retain_with(
                            base_op.len(),
                            attributes::invert(attributes, &base_attrs),
                        );
                    }
                    base_index += length;
                }
                Op::Delete { length } => {
                    for base_op in base.slice(base_index, base_index + length).ops {
                        inverted.push(base_op);
                    }
                    base_index += length;
                }
            }
        }

        Ok(inverted.chop())
    }

    /// Map a cursor offset through this delta.
    ///
    /// Inserts before the cursor push it forward, deletes before it pull it
    /// back (never below the deleted range's start). With `priority` unset an
    /// insert exactly at the cursor also pushes it forward.
    pub fn transform_position(&self, index: usize, priority: bool) -> usize {
        let mut iter = OpIter::new(&self.ops);
        let mut index = index;
        let mut offset = 0;

        while iter.has_next() && offset <= index {
            let length = iter.peek_length();
            let kind = iter.peek_kind();
            iter.next_op();

            match kind {
                OpKind::Delete => {
                    index -= length.min(index - offset);
                    continue;
                }
                OpKind::Insert if offset < index || !priority => {
                    index += length;
                }
                _ => {}
            }
            offset += length;
        }

        index
    }
}

impl From<Vec<Op>> for Delta {
    fn from(ops: Vec<Op>) -> Self {
        let mut delta = Delta::new();
        for op in ops {
            delta.push(op);
        }
        delta
    }
}

impl From<Delta> for Vec<Op> {
    fn from(delta: Delta) -> Self {
        delta.ops
    }
}

impl FromIterator<Op> for Delta {
    fn from_iter<I: IntoIterator<Item = Op>>(iter: I) -> Self {
        let mut delta = Delta::new();
        for op in iter {
            delta.push(op);
        }
        delta
    }
}
