//! Delta log records and compaction snapshots.
//!
//! A [`DeltaRecord`] is immutable once the log has given it a timestamp. The
//! client builds records with `timestamp: None` and only ever reads or
//! appends them.

use folio_delta::Delta;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Random per-session identifier, used only to recognise our own records.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditorId(pub String);

impl EditorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random editor ID.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl fmt::Display for EditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a record, chosen by the client before appending.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned commit timestamp, strictly increasing per document.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ServerTimestamp(pub u64);

impl ServerTimestamp {
    /// Before any record.
    pub const ZERO: ServerTimestamp = ServerTimestamp(0);

    pub fn next(self) -> Self {
        ServerTimestamp(self.0 + 1)
    }
}

impl fmt::Display for ServerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed (or about to be committed) change to a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRecord {
    pub id: RecordId,
    #[serde(rename = "editorID")]
    pub editor_id: EditorId,
    pub author: String,
    /// `None` until the log commits the record.
    #[serde(default)]
    pub timestamp: Option<ServerTimestamp>,
    /// The author's watermark when the ops were cut; records committed after
    /// it and before `timestamp` were concurrent with this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_timestamp: Option<ServerTimestamp>,
    pub ops: Delta,
}

impl DeltaRecord {
    /// A new uncommitted record with a fresh ID.
    pub fn new(
        editor_id: EditorId,
        author: impl Into<String>,
        base_timestamp: Option<ServerTimestamp>,
        ops: Delta,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            editor_id,
            author: author.into(),
            timestamp: None,
            base_timestamp,
            ops,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.timestamp.is_some()
    }

    /// The same record as committed at `timestamp`.
    pub fn committed_at(mut self, timestamp: ServerTimestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A compaction checkpoint: the document as of `snapshot_timestamp`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(rename = "latestSnapshot")]
    pub ops: Delta,
    #[serde(rename = "latestSnapshotTimestamp")]
    pub snapshot_timestamp: ServerTimestamp,
}

impl DocumentSnapshot {
    pub fn new(ops: Delta, snapshot_timestamp: ServerTimestamp) -> Self {
        Self {
            ops,
            snapshot_timestamp,
        }
    }

    /// The empty document: a single trailing newline.
    pub fn empty() -> Self {
        Self {
            ops: Delta::from_text("\n"),
            snapshot_timestamp: ServerTimestamp::ZERO,
        }
    }
}

impl Default for DocumentSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_format() {
        let mut ops = Delta::new();
        ops.insert("Hello");
        let record = DeltaRecord::new(EditorId::new("ed-1"), "alice", None, ops)
            .committed_at(ServerTimestamp(7));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["editorID"], "ed-1");
        assert_eq!(json["timestamp"], 7);
        assert_eq!(json["ops"][0]["insert"], "Hello");
        assert!(json.get("baseTimestamp").is_none());

        let parsed: DeltaRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_uncommitted_record_parses_without_timestamp() {
        let parsed: DeltaRecord = serde_json::from_str(
            r#"{"id":"r1","editorID":"e1","author":"bob","ops":[{"insert":"x"}]}"#,
        )
        .unwrap();

        assert!(!parsed.is_committed());
        assert_eq!(parsed.base_timestamp, None);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(EditorId::generate(), EditorId::generate());
        assert_ne!(RecordId::generate(), RecordId::generate());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = DocumentSnapshot::empty();
        assert_eq!(snapshot.ops.text(), "\n");
        assert_eq!(snapshot.snapshot_timestamp, ServerTimestamp::ZERO);
    }
}
