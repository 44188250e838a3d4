//! Cursor over a slice of ops that can split ops at arbitrary lengths.

use crate::op::{char_slice, Op, OpKind};

/// Walks a delta op by op, handing out pieces of at most a requested length.
///
/// Past the last op the iterator behaves as an infinite plain retain, which
/// is what gives every delta an implicit "keep the rest" tail.
#[derive(Debug, Clone)]
pub struct OpIter<'a> {
    ops: &'a [Op],
    index: usize,
    offset: usize,
}

impl<'a> OpIter<'a> {
    pub fn new(ops: &'a [Op]) -> Self {
        Self {
            ops,
            index: 0,
            offset: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.peek_length() < usize::MAX
    }

    pub fn peek(&self) -> Option<&'a Op> {
        self.ops.get(self.index)
    }

    /// Remaining length of the current op, `usize::MAX` once exhausted.
    pub fn peek_length(&self) -> usize {
        match self.peek() {
            Some(op) => op.len() - self.offset,
            None => usize::MAX,
        }
    }

    pub fn peek_kind(&self) -> OpKind {
        self.peek().map(Op::kind).unwrap_or(OpKind::Retain)
    }

    /// Take up to `length` characters from the current op.
    pub fn next_len(&mut self, length: usize) -> Op {
        let Some(op) = self.ops.get(self.index) else {
            return Op::retain(length);
        };

        let offset = self.offset;
        let remaining = op.len() - offset;
        let length = if length >= remaining {
            self.index += 1;
            self.offset = 0;
            remaining
        } else {
            self.offset += length;
            length
        };

        match op {
            Op::Insert { text, attributes } => Op::Insert {
                text: char_slice(text, offset, length),
                attributes: attributes.clone(),
            },
            Op::Retain { attributes, .. } => Op::Retain {
                length,
                attributes: attributes.clone(),
            },
            Op::Delete { .. } => Op::Delete { length },
        }
    }

    /// Take whatever is left of the current op.
    pub fn next_op(&mut self) -> Op {
        self.next_len(usize::MAX)
    }

    /// Everything not yet consumed.
    pub fn rest(&self) -> Vec<Op> {
        let mut rest = self.clone();
        let mut ops = Vec::new();
        while rest.has_next() {
            ops.push(rest.next_op());
        }
        ops
    }
}
