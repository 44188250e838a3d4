//! Property-based tests for highlight reconciliation
//!
//! Laws checked against arbitrary highlighted documents:
//!  - Idempotence: once a plan is applied, planning again issues no writes
//!  - Every span in the text becomes exactly one created highlight
//!  - Stripping the attribute deletes every known highlight

use folio_db::{plan, scan_highlights, Highlight, HighlightAttr, HighlightId, TagId, HIGHLIGHT_ATTRIBUTE};
use folio_delta::{AttributeMap, Delta};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;

/// A text plus highlights as (start, length, tag) triples relative to it.
fn highlighted_strategy() -> impl Strategy<Value = (String, Vec<(usize, usize, u8)>)> {
    "[a-z ]{1,24}".prop_flat_map(|text| {
        let len = text.chars().count();
        let mark = (0..len, 1usize..6, 0u8..3);
        (Just(text), prop::collection::vec(mark, 0..4))
    })
}

fn build_document(text: &str, marks: &[(usize, usize, u8)]) -> Delta {
    let mut doc = Delta::from_text(&format!("{}\n", text));
    let editable = text.chars().count();
    for (i, (start, length, tag)) in marks.iter().enumerate() {
        let length = (*length).min(editable - start);
        let attributes = HighlightAttr::new(
            HighlightId::new(format!("h{}", i)),
            TagId::new(format!("T{}", tag)),
        )
        .to_attributes()
        .expect("highlight attribute serializes");
        let mut change = Delta::new();
        change.retain(*start).retain_with(length, attributes);
        doc = change.apply_to(&doc).expect("mark fits the document");
    }
    doc
}

proptest! {
    #[test]
    fn reconcile_is_idempotent((text, marks) in highlighted_strategy()) {
        let doc = build_document(&text, &marks);
        let spans = scan_highlights(&doc);

        let mut known: BTreeMap<HighlightId, Highlight> = BTreeMap::new();
        let first = plan("doc", &known, &spans, 1);
        prop_assert_eq!(first.created.len(), spans.len());
        prop_assert!(first.updated.is_empty());
        prop_assert!(first.deleted.is_empty());

        first.apply_to(&mut known);
        let second = plan("doc", &known, &spans, 2);
        prop_assert!(second.is_empty());
    }

    #[test]
    fn created_text_matches_selection((text, marks) in highlighted_strategy()) {
        let doc = build_document(&text, &marks);
        let chars: Vec<char> = doc.text().chars().collect();
        for highlight in plan("doc", &BTreeMap::new(), &scan_highlights(&doc), 1).created {
            let end = highlight.selection.index + highlight.selection.length;
            let expected: String = chars[highlight.selection.index..end].iter().collect();
            prop_assert_eq!(highlight.text, expected);
        }
    }

    #[test]
    fn stripping_attribute_deletes_everything((text, marks) in highlighted_strategy()) {
        let doc = build_document(&text, &marks);
        let mut known = BTreeMap::new();
        plan("doc", &known, &scan_highlights(&doc), 1).apply_to(&mut known);

        let mut strip = Delta::new();
        strip.retain_with(doc.length(), AttributeMap::new().with(HIGHLIGHT_ATTRIBUTE, Value::Null));
        let stripped = strip.apply_to(&doc).expect("strip covers the document");

        let writes = plan("doc", &known, &scan_highlights(&stripped), 2);
        prop_assert_eq!(writes.deleted.len(), known.len());
        prop_assert!(writes.created.is_empty());
        prop_assert!(writes.updated.is_empty());
    }
}
