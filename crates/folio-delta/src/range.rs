//! Text ranges (selections, highlight extents) and how edits move them.

use crate::delta::Delta;
use serde::{Deserialize, Serialize};

/// A `[index, index + length)` range of characters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub index: usize,
    pub length: usize,
}

impl TextRange {
    pub fn new(index: usize, length: usize) -> Self {
        Self { index, length }
    }

    /// A collapsed range (a caret).
    pub fn caret(index: usize) -> Self {
        Self { index, length: 0 }
    }

    pub fn end(&self) -> usize {
        self.index + self.length
    }

    pub fn is_collapsed(&self) -> bool {
        self.length == 0
    }

    /// Map both ends of the range through `delta`.
    pub fn transform(&self, delta: &Delta) -> TextRange {
        let start = delta.transform_position(self.index, false);
        let end = delta.transform_position(self.end(), false);
        TextRange {
            index: start,
            length: end.saturating_sub(start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeMap;

    #[test]
    fn test_range_moves_with_insert_before() {
        let mut delta = Delta::new();
        delta.insert("xyz");

        assert_eq!(TextRange::new(5, 2).transform(&delta), TextRange::new(8, 2));
    }

    #[test]
    fn test_range_shrinks_when_partially_deleted() {
        let mut delta = Delta::new();
        delta.retain(4).delete(3);

        assert_eq!(TextRange::new(2, 4).transform(&delta), TextRange::new(2, 2));
    }

    #[test]
    fn test_range_ignores_formatting() {
        let mut delta = Delta::new();
        delta.retain_with(10, AttributeMap::new().with("bold", true));

        let range = TextRange::new(3, 4);
        assert_eq!(range.transform(&delta), range);
    }
}
