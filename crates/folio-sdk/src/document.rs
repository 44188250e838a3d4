//! The local document replica: what the editor shows and edits.

use crate::error::Result;
use folio_db::{DocumentSnapshot, HighlightAttr, HighlightId, TagId, HIGHLIGHT_ATTRIBUTE};
use folio_delta::{AttributeMap, Delta, TextRange};
use serde_json::Value;
use tokio::sync::broadcast;

/// Who produced a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeSource {
    /// Typed or formatted by the local user.
    User,
    /// Merged in from the delta log.
    Sync,
    /// Made programmatically, not to be shared.
    Api,
}

/// Events emitted when the replica changes.
#[derive(Clone, Debug)]
pub enum DocEvent {
    /// Contents changed by `delta`.
    Changed { delta: Delta, source: ChangeSource },
    /// The selection moved or was cleared.
    SelectionChanged(Option<TextRange>),
}

/// The adapter surface between the sync engine and an editor.
///
/// `subscribe` stands in for the editor's edit and selection callbacks.
pub trait DocumentReplica {
    /// Get the document ID.
    fn id(&self) -> &str;

    fn get_contents(&self) -> &Delta;

    /// Apply `delta` to the contents and map the selection through it.
    fn update_contents(&mut self, delta: &Delta, source: ChangeSource) -> Result<()>;

    fn get_selection(&self) -> Option<TextRange>;

    fn set_selection(&mut self, range: Option<TextRange>);

    /// Subscribe to document events.
    fn subscribe(&self) -> broadcast::Receiver<DocEvent>;
}

/// An in-memory rich-text replica.
pub struct RichTextDoc {
    id: String,
    contents: Delta,
    selection: Option<TextRange>,
    event_tx: broadcast::Sender<DocEvent>,
}

impl RichTextDoc {
    /// Create an empty document (a lone newline).
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_snapshot(id, &DocumentSnapshot::empty())
    }

    /// Create a document holding a snapshot's contents.
    pub fn from_snapshot(id: impl Into<String>, snapshot: &DocumentSnapshot) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            id: id.into(),
            contents: snapshot.ops.clone(),
            selection: None,
            event_tx,
        }
    }

    /// Get the plain text content.
    pub fn get_text(&self) -> String {
        self.contents.text()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.contents.length()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.length() == 0
    }

    // === Editing helpers ===
    //
    // Each applies a user change and returns the delta the editor emitted.

    pub fn insert_text(
        &mut self,
        index: usize,
        text: &str,
        attributes: Option<AttributeMap>,
    ) -> Result<Delta> {
        let mut delta = Delta::new();
        delta
            .retain(index)
            .insert_with(text, attributes.unwrap_or_default());
        self.user_edit(delta)
    }

    pub fn delete_text(&mut self, index: usize, length: usize) -> Result<Delta> {
        let mut delta = Delta::new();
        delta.retain(index).delete(length);
        self.user_edit(delta)
    }

    /// Set `attributes` over a range; a `null` value removes that attribute.
    pub fn format_text(
        &mut self,
        index: usize,
        length: usize,
        attributes: AttributeMap,
    ) -> Result<Delta> {
        let mut delta = Delta::new();
        delta.retain(index).retain_with(length, attributes);
        self.user_edit(delta)
    }

    /// Strip every attribute from a range.
    pub fn remove_format(&mut self, index: usize, length: usize) -> Result<Delta> {
        let mut delta = Delta::new();
        delta.retain(index);
        for op in self.contents.slice(index, index + length).ops() {
            let cleared: AttributeMap = op
                .attributes()
                .map(|attrs| attrs.keys().map(|key| (key.clone(), Value::Null)).collect())
                .unwrap_or_default();
            delta.retain_with(op.len(), cleared);
        }
        self.user_edit(delta)
    }

    /// Tag `range` as a new highlight.
    pub fn highlight(&mut self, range: TextRange, tag_id: TagId) -> Result<(HighlightId, Delta)> {
        let highlight_id = HighlightId::generate();
        let attributes = HighlightAttr::new(highlight_id.clone(), tag_id).to_attributes()?;
        let delta = self.format_text(range.index, range.length, attributes)?;
        Ok((highlight_id, delta))
    }

    /// Remove the highlight attribute from a range.
    pub fn remove_highlight(&mut self, range: TextRange) -> Result<Delta> {
        let attributes = AttributeMap::new().with(HIGHLIGHT_ATTRIBUTE, Value::Null);
        self.format_text(range.index, range.length, attributes)
    }

    fn user_edit(&mut self, delta: Delta) -> Result<Delta> {
        self.update_contents(&delta, ChangeSource::User)?;
        Ok(delta)
    }
}

impl DocumentReplica for RichTextDoc {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_contents(&self) -> &Delta {
        &self.contents
    }

    fn update_contents(&mut self, delta: &Delta, source: ChangeSource) -> Result<()> {
        self.contents = delta.apply_to(&self.contents)?;
        let _ = self.event_tx.send(DocEvent::Changed {
            delta: delta.clone(),
            source,
        });

        if let Some(selection) = self.selection {
            let moved = selection.transform(delta);
            if moved != selection {
                self.set_selection(Some(moved));
            }
        }
        Ok(())
    }

    fn get_selection(&self) -> Option<TextRange> {
        self.selection
    }

    fn set_selection(&mut self, range: Option<TextRange>) {
        let length = self.contents.length();
        let range = range.map(|r| {
            let index = r.index.min(length);
            TextRange::new(index, r.length.min(length - index))
        });
        if range != self.selection {
            self.selection = range;
            let _ = self.event_tx.send(DocEvent::SelectionChanged(range));
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_db::scan_highlights;

    #[test]
    fn test_rich_text_doc() {
        let mut doc = RichTextDoc::new("doc-1");
        doc.insert_text(0, "Hello World", None).unwrap();
        doc.format_text(0, 5, AttributeMap::new().with("bold", true))
            .unwrap();

        assert_eq!(doc.get_text(), "Hello World\n");
        assert_eq!(doc.len(), 12);
        assert_eq!(doc.get_contents().ops().len(), 2);
    }

    #[test]
    fn test_edit_past_end_is_rejected() {
        let mut doc = RichTextDoc::new("doc-1");
        assert!(doc.insert_text(5, "x", None).is_err());
        assert!(doc.delete_text(0, 3).is_err());
        assert_eq!(doc.get_text(), "\n");
    }

    #[test]
    fn test_remove_format_clears_every_attribute() {
        let mut doc = RichTextDoc::new("doc-1");
        doc.insert_text(0, "Hello", None).unwrap();
        doc.format_text(1, 2, AttributeMap::new().with("bold", true))
            .unwrap();
        doc.format_text(2, 3, AttributeMap::new().with("italic", true))
            .unwrap();

        doc.remove_format(0, 5).unwrap();
        assert_eq!(doc.get_contents(), &Delta::from_text("Hello\n"));
    }

    #[test]
    fn test_highlight_selection() {
        let mut doc = RichTextDoc::new("doc-1");
        doc.insert_text(0, "Hello", None).unwrap();
        let (id, _) = doc.highlight(TextRange::new(1, 4), TagId::new("T1")).unwrap();

        let spans = scan_highlights(doc.get_contents());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].highlight_id, id);
        assert_eq!(spans[0].text, "ello");

        doc.remove_highlight(TextRange::new(1, 4)).unwrap();
        assert!(scan_highlights(doc.get_contents()).is_empty());
    }

    #[test]
    fn test_selection_follows_edits() {
        let mut doc = RichTextDoc::new("doc-1");
        doc.insert_text(0, "Hello", None).unwrap();
        doc.set_selection(Some(TextRange::caret(5)));

        doc.insert_text(0, "xyz", None).unwrap();
        assert_eq!(doc.get_selection(), Some(TextRange::caret(8)));

        doc.delete_text(0, 3).unwrap();
        assert_eq!(doc.get_selection(), Some(TextRange::caret(5)));

        doc.format_text(0, 1, AttributeMap::new().with("highlight", "T1"))
            .unwrap();
        assert_eq!(doc.get_selection(), Some(TextRange::caret(5)));
    }

    #[test]
    fn test_events() {
        let mut doc = RichTextDoc::new("doc-1");
        let mut rx = doc.subscribe();
        doc.insert_text(0, "a", None).unwrap();

        match rx.try_recv().unwrap() {
            DocEvent::Changed { source, .. } => assert_eq!(source, ChangeSource::User),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
