//! Three-way diff of highlight records against the spans in a document.
//!
//! The document is the source of truth. Given the highlights the store is
//! known to hold and the spans currently in the text, [`plan`] works out the
//! writes that bring the store in line:
//!
//! - a known highlight with no span is deleted
//! - a known highlight whose tag, selection or text changed is patched
//! - a span with no known highlight is created
//!
//! Planning against a store that already matches the text yields no writes.

use crate::highlight::{Highlight, HighlightFields, HighlightId};
use crate::spans::HighlightSpan;
use std::collections::{BTreeMap, HashMap};

/// The store writes needed to match a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub created: Vec<Highlight>,
    /// Merge patches carrying only the changed fields.
    pub updated: Vec<(HighlightId, HighlightFields)>,
    pub deleted: Vec<HighlightId>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Number of store writes the plan issues.
    pub fn write_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Bring `known` to the state the plan produces, as if every write
    /// succeeded.
    pub fn apply_to(&self, known: &mut BTreeMap<HighlightId, Highlight>) {
        for id in &self.deleted {
            known.remove(id);
        }
        for (id, patch) in &self.updated {
            if let Some(highlight) = known.get_mut(id) {
                patch.apply_to(highlight);
            }
        }
        for highlight in &self.created {
            known.insert(highlight.id.clone(), highlight.clone());
        }
    }
}

/// The changed fields of `known` relative to `span`, or `None` when they
/// match.
pub fn diff(known: &Highlight, span: &HighlightSpan, now: i64) -> Option<HighlightFields> {
    let mut patch = HighlightFields::default();
    if known.tag_id != span.tag_id {
        patch.tag_id = Some(span.tag_id.clone());
    }
    if known.selection != span.selection {
        patch.selection = Some(span.selection);
    }
    if known.text != span.text {
        patch.text = Some(span.text.clone());
    }

    if patch.is_empty() {
        return None;
    }
    patch.last_update_timestamp = Some(now);
    Some(patch)
}

/// Plan the writes that make `known` match `spans`.
///
/// `now` stamps created and updated records, in milliseconds since the epoch.
pub fn plan(
    document_id: &str,
    known: &BTreeMap<HighlightId, Highlight>,
    spans: &[HighlightSpan],
    now: i64,
) -> ReconcilePlan {
    let current: HashMap<&HighlightId, &HighlightSpan> =
        spans.iter().map(|span| (&span.highlight_id, span)).collect();
    let mut plan = ReconcilePlan::default();

    for (id, highlight) in known {
        match current.get(id) {
            None => plan.deleted.push(id.clone()),
            Some(span) => {
                if let Some(patch) = diff(highlight, span, now) {
                    plan.updated.push((id.clone(), patch));
                }
            }
        }
    }

    for span in spans {
        if known.contains_key(&span.highlight_id) {
            continue;
        }
        plan.created.push(Highlight {
            id: span.highlight_id.clone(),
            document_id: document_id.to_string(),
            tag_id: span.tag_id.clone(),
            selection: span.selection,
            text: span.text.clone(),
            creation_timestamp: now,
            last_update_timestamp: now,
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::{HighlightAttr, TagId};
    use crate::spans::scan_highlights;
    use folio_delta::{AttributeMap, Delta, TextRange};

    fn hello() -> Delta {
        Delta::from_text("Hello\n")
    }

    fn tag_range(doc: &Delta, index: usize, length: usize, id: &str, tag: &str) -> Delta {
        let attributes = HighlightAttr::new(HighlightId::new(id), TagId::new(tag))
            .to_attributes()
            .unwrap();
        let mut change = Delta::new();
        change.retain(index).retain_with(length, attributes);
        change.apply_to(doc).unwrap()
    }

    #[test]
    fn test_new_span_creates_highlight() {
        let doc = tag_range(&hello(), 1, 4, "h1", "T1");
        let plan = plan("doc", &BTreeMap::new(), &scan_highlights(&doc), 100);

        assert_eq!(plan.created.len(), 1);
        let created = &plan.created[0];
        assert_eq!(created.text, "ello");
        assert_eq!(created.selection, TextRange::new(1, 4));
        assert_eq!(created.document_id, "doc");
        assert_eq!(created.creation_timestamp, 100);
        assert_eq!(created.last_update_timestamp, 100);
        assert!(plan.updated.is_empty());
        assert!(plan.deleted.is_empty());
    }

    #[test]
    fn test_removed_format_deletes_highlight() {
        let doc = tag_range(&hello(), 1, 4, "h1", "T1");
        let mut known = BTreeMap::new();
        plan("doc", &known, &scan_highlights(&doc), 100).apply_to(&mut known);

        let mut remove = Delta::new();
        remove.retain(1).retain_with(
            4,
            AttributeMap::new().with("highlight", serde_json::Value::Null),
        );
        let cleared = remove.apply_to(&doc).unwrap();

        let plan = plan("doc", &known, &scan_highlights(&cleared), 200);
        assert_eq!(plan.deleted, vec![HighlightId::new("h1")]);
        assert_eq!(plan.write_count(), 1);
    }

    #[test]
    fn test_changed_span_is_patched() {
        let doc = tag_range(&hello(), 1, 4, "h1", "T1");
        let mut known = BTreeMap::new();
        plan("doc", &known, &scan_highlights(&doc), 100).apply_to(&mut known);

        let mut edit = Delta::new();
        edit.insert("Oh ");
        let moved = edit.apply_to(&doc).unwrap();

        let plan = plan("doc", &known, &scan_highlights(&moved), 200);
        assert_eq!(plan.updated.len(), 1);
        let (id, patch) = &plan.updated[0];
        assert_eq!(id, &HighlightId::new("h1"));
        assert_eq!(patch.selection, Some(TextRange::new(4, 4)));
        assert_eq!(patch.last_update_timestamp, Some(200));
        assert_eq!(patch.text, None);
        assert_eq!(patch.tag_id, None);
        assert_eq!(patch.creation_timestamp, None);
    }

    #[test]
    fn test_retag_is_patched() {
        let doc = tag_range(&hello(), 1, 4, "h1", "T1");
        let mut known = BTreeMap::new();
        plan("doc", &known, &scan_highlights(&doc), 100).apply_to(&mut known);

        let retagged = tag_range(&doc, 1, 4, "h1", "T2");
        let plan = plan("doc", &known, &scan_highlights(&retagged), 200);

        assert_eq!(plan.updated[0].1.tag_id, Some(TagId::new("T2")));
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let doc = tag_range(&tag_range(&hello(), 0, 2, "h1", "T1"), 3, 2, "h2", "T2");
        let spans = scan_highlights(&doc);
        let mut known = BTreeMap::new();

        let first = plan("doc", &known, &spans, 100);
        assert_eq!(first.created.len(), 2);
        first.apply_to(&mut known);

        let second = plan("doc", &known, &spans, 300);
        assert!(second.is_empty());
        assert_eq!(second.write_count(), 0);
    }
}
