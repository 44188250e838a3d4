//! Finding highlight spans in a document.

use crate::highlight::{HighlightAttr, HighlightId, TagId};
use folio_delta::{Delta, Op, TextRange};
use std::collections::HashMap;

/// The extent of one highlight in the current document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HighlightSpan {
    pub highlight_id: HighlightId,
    pub tag_id: TagId,
    pub selection: TextRange,
    pub text: String,
}

/// Collect every highlight carried by `document`, in order of first
/// appearance.
///
/// Runs sharing a highlight ID are merged into one span reaching from the
/// start of the first run to the end of the last; the tag comes from the
/// first run. Runs whose attribute cannot be parsed are ignored.
pub fn scan_highlights(document: &Delta) -> Vec<HighlightSpan> {
    let mut order: Vec<(HighlightId, TagId)> = Vec::new();
    let mut extents: HashMap<HighlightId, (usize, usize)> = HashMap::new();
    let mut chars: Vec<char> = Vec::new();

    for op in document.ops() {
        let Op::Insert { text, attributes } = op else {
            continue;
        };
        let start = chars.len();
        chars.extend(text.chars());
        let end = chars.len();

        let Ok(Some(attr)) = HighlightAttr::from_attributes(attributes) else {
            continue;
        };
        match extents.get_mut(&attr.highlight_id) {
            Some(extent) => extent.1 = end,
            None => {
                extents.insert(attr.highlight_id.clone(), (start, end));
                order.push((attr.highlight_id, attr.tag_id));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|(highlight_id, tag_id)| {
            let (start, end) = *extents.get(&highlight_id)?;
            Some(HighlightSpan {
                selection: TextRange::new(start, end - start),
                text: chars[start..end].iter().collect(),
                highlight_id,
                tag_id,
            })
        })
        .collect()
}
