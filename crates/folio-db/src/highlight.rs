//! Highlight records and the formatting attribute that marks them in text.
//!
//! A highlight lives twice: as a `highlight` attribute on a run of text in
//! the document, and as a [`Highlight`] record in the highlight store. The
//! text is the source of truth; records are derived from it.

use crate::error::{DbError, Result};
use folio_delta::{AttributeMap, TextRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Attribute key carrying a [`HighlightAttr`].
pub const HIGHLIGHT_ATTRIBUTE: &str = "highlight";

/// Unique identifier for a highlight.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HighlightId(pub String);

impl HighlightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the tag a highlight is filed under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagId(pub String);

impl TagId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value of the `highlight` attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightAttr {
    #[serde(rename = "highlightID")]
    pub highlight_id: HighlightId,
    #[serde(rename = "tagID")]
    pub tag_id: TagId,
}

impl HighlightAttr {
    pub fn new(highlight_id: HighlightId, tag_id: TagId) -> Self {
        Self {
            highlight_id,
            tag_id,
        }
    }

    /// Attributes that apply this highlight.
    pub fn to_attributes(&self) -> Result<AttributeMap> {
        let value = serde_json::to_value(self)?;
        Ok(AttributeMap::new().with(HIGHLIGHT_ATTRIBUTE, value))
    }

    /// Read the highlight from a run's attributes.
    ///
    /// `Ok(None)` when the run is not highlighted.
    pub fn from_attributes(attributes: &AttributeMap) -> Result<Option<Self>> {
        match attributes.get(HIGHLIGHT_ATTRIBUTE) {
            None => Ok(None),
            Some(value) if value.is_null() => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| DbError::InvalidAttribute(e.to_string())),
        }
    }
}

/// A highlight record as kept in the highlight store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    #[serde(rename = "ID")]
    pub id: HighlightId,
    #[serde(rename = "documentID")]
    pub document_id: String,
    #[serde(rename = "tagID")]
    pub tag_id: TagId,
    pub selection: TextRange,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub creation_timestamp: i64,
    pub last_update_timestamp: i64,
}

/// A partial highlight: the `fields` of a store `set`.
///
/// With `merge` the present fields patch an existing record; without it they
/// must describe a whole record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightFields {
    #[serde(rename = "documentID", default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(rename = "tagID", default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<TagId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<TextRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_timestamp: Option<i64>,
}

impl HighlightFields {
    pub fn is_empty(&self) -> bool {
        *self == HighlightFields::default()
    }

    /// Overwrite the present fields on `highlight`.
    pub fn apply_to(&self, highlight: &mut Highlight) {
        if let Some(document_id) = &self.document_id {
            highlight.document_id = document_id.clone();
        }
        if let Some(tag_id) = &self.tag_id {
            highlight.tag_id = tag_id.clone();
        }
        if let Some(selection) = self.selection {
            highlight.selection = selection;
        }
        if let Some(text) = &self.text {
            highlight.text = text.clone();
        }
        if let Some(ts) = self.creation_timestamp {
            highlight.creation_timestamp = ts;
        }
        if let Some(ts) = self.last_update_timestamp {
            highlight.last_update_timestamp = ts;
        }
    }

    /// Build a whole record; every field must be present.
    pub fn into_highlight(self, id: HighlightId) -> Result<Highlight> {
        let missing = |field: &'static str| DbError::IncompleteHighlight {
            id: id.0.clone(),
            field,
        };

        Ok(Highlight {
            document_id: self.document_id.ok_or_else(|| missing("documentID"))?,
            tag_id: self.tag_id.ok_or_else(|| missing("tagID"))?,
            selection: self.selection.ok_or_else(|| missing("selection"))?,
            text: self.text.ok_or_else(|| missing("text"))?,
            creation_timestamp: self
                .creation_timestamp
                .ok_or_else(|| missing("creationTimestamp"))?,
            last_update_timestamp: self
                .last_update_timestamp
                .ok_or_else(|| missing("lastUpdateTimestamp"))?,
            id,
        })
    }
}

impl From<Highlight> for HighlightFields {
    fn from(highlight: Highlight) -> Self {
        Self {
            document_id: Some(highlight.document_id),
            tag_id: Some(highlight.tag_id),
            selection: Some(highlight.selection),
            text: Some(highlight.text),
            creation_timestamp: Some(highlight.creation_timestamp),
            last_update_timestamp: Some(highlight.last_update_timestamp),
        }
    }
}
