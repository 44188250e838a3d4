//! The three edit operations a delta is made of.

use crate::attributes::AttributeMap;
use serde::{Deserialize, Serialize};

/// A single edit operation.
///
/// Lengths are measured in Unicode scalar values (`char`s), never bytes.
/// The wire form matches the usual rich-text delta JSON:
/// `{"insert": "abc", "attributes": {..}}`, `{"retain": 3}`, `{"delete": 2}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Op {
    /// Insert text, optionally formatted.
    Insert {
        #[serde(rename = "insert")]
        text: String,
        #[serde(default, skip_serializing_if = "AttributeMap::is_empty")]
        attributes: AttributeMap,
    },
    /// Keep `length` characters, optionally changing their formatting.
    Retain {
        #[serde(rename = "retain")]
        length: usize,
        #[serde(default, skip_serializing_if = "AttributeMap::is_empty")]
        attributes: AttributeMap,
    },
    /// Remove `length` characters.
    Delete {
        #[serde(rename = "delete")]
        length: usize,
    },
}

/// Discriminant of an [`Op`], used by the iterators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Retain,
    Delete,
}

impl Op {
    pub fn insert(text: impl Into<String>) -> Self {
        Op::Insert {
            text: text.into(),
            attributes: AttributeMap::new(),
        }
    }

    pub fn insert_with(text: impl Into<String>, attributes: AttributeMap) -> Self {
        Op::Insert {
            text: text.into(),
            attributes,
        }
    }

    pub fn retain(length: usize) -> Self {
        Op::Retain {
            length,
            attributes: AttributeMap::new(),
        }
    }

    pub fn retain_with(length: usize, attributes: AttributeMap) -> Self {
        Op::Retain { length, attributes }
    }

    pub fn delete(length: usize) -> Self {
        Op::Delete { length }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Op::Insert { .. } => OpKind::Insert,
            Op::Retain { .. } => OpKind::Retain,
            Op::Delete { .. } => OpKind::Delete,
        }
    }

    /// Number of characters this op inserts, keeps or removes.
    pub fn len(&self) -> usize {
        match self {
            Op::Insert { text, .. } => text.chars().count(),
            Op::Retain { length, .. } | Op::Delete { length } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Op::Insert { .. })
    }

    pub fn is_retain(&self) -> bool {
        matches!(self, Op::Retain { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Op::Delete { .. })
    }

    /// Formatting attributes; `None` for deletes.
    pub fn attributes(&self) -> Option<&AttributeMap> {
        match self {
            Op::Insert { attributes, .. } | Op::Retain { attributes, .. } => Some(attributes),
            Op::Delete { .. } => None,
        }
    }
}

/// Take `length` chars of `text` starting at char `offset`.
pub(crate) fn char_slice(text: &str, offset: usize, length: usize) -> String {
    text.chars().skip(offset).take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_counts_chars() {
        assert_eq!(Op::insert("héllo").len(), 5);
        assert_eq!(Op::retain(3).len(), 3);
        assert_eq!(Op::delete(2).len(), 2);
    }

    #[test]
    fn test_wire_format() {
        let op = Op::insert_with("Hi", AttributeMap::new().with("bold", true));
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"insert":"Hi","attributes":{"bold":true}}"#);

        let parsed: Vec<Op> =
            serde_json::from_str(r#"[{"retain":5},{"delete":2},{"insert":"x"}]"#).unwrap();
        assert_eq!(parsed, vec![Op::retain(5), Op::delete(2), Op::insert("x")]);
    }

    #[test]
    fn test_char_slice() {
        assert_eq!(char_slice("héllo", 1, 3), "éll");
        assert_eq!(char_slice("abc", 2, 10), "c");
    }
}
