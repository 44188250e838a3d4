//! The synchronization protocol between a replica and the delta log.
//!
//! [`SyncManager`] owns the protocol state for one document: the confirmed
//! document (everything committed up to the watermark), the local edit
//! buffer, the watermark and the recently applied records. It is driven from
//! outside: the session feeds it local edits, subscription snapshots and
//! append results, and it never holds a lock or spawns a task itself.
//!
//! Invariant: the replica always reads `confirmed ∘ buffer.combined()`.

use crate::buffer::{FlushState, LocalEditBuffer};
use crate::document::{ChangeSource, DocumentReplica};
use crate::error::{Result, SdkError, StoreError};
use crate::history::{AppliedRecord, History};
use crate::store::RemoteDeltaLog;
use folio_db::{DeltaRecord, DocumentSnapshot, EditorId, RecordId, ServerTimestamp};
use folio_delta::{Delta, TextRange};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Configuration for sync behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often to flush the local edit buffer (in milliseconds).
    pub flush_interval_ms: u64,
    /// How often to reconcile highlights (in milliseconds).
    pub reconcile_interval_ms: u64,
    /// Consecutive store failures before sync is reported degraded.
    pub max_consecutive_failures: u32,
    /// Run the periodic flush and reconcile ticks.
    pub auto_sync: bool,
    /// Applied records kept for rebasing concurrent records.
    pub history_limit: usize,
    /// Capacity of the sync event channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1000,
            reconcile_interval_ms: 1000,
            max_consecutive_failures: 5,
            auto_sync: true,
            history_limit: 4096,
            event_capacity: 100,
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn flush_interval(mut self, ms: u64) -> Self {
        self.config.flush_interval_ms = ms;
        self
    }

    pub fn reconcile_interval(mut self, ms: u64) -> Self {
        self.config.reconcile_interval_ms = ms;
        self
    }

    pub fn max_consecutive_failures(mut self, count: u32) -> Self {
        self.config.max_consecutive_failures = count;
        self
    }

    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.config.auto_sync = enabled;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Events emitted by the sync manager and the highlight reconciler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// Our record came back committed.
    Flushed {
        record_id: RecordId,
        timestamp: ServerTimestamp,
    },
    /// Remote records were merged into the replica.
    RemoteApplied {
        records: usize,
        watermark: ServerTimestamp,
    },
    /// Store calls keep failing.
    Degraded {
        consecutive_failures: u32,
        error: String,
    },
    /// A store call succeeded after sync was degraded.
    Recovered,
    /// A record did not fit the document; the pull was aborted.
    ProtocolError { error: String },
    /// A reconciliation pass wrote to the highlight store.
    HighlightsReconciled {
        created: usize,
        updated: usize,
        deleted: usize,
    },
}

/// What a pull cycle did with the records it was given.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// Remote records merged into the replica.
    pub applied: usize,
    /// Our in-flight record, seen committed.
    pub confirmed: Option<RecordId>,
    /// At or below the watermark, or already consumed.
    pub stale: usize,
    /// Not yet committed; picked up again once timestamped.
    pub deferred: usize,
    /// Authored by this editor but not in flight.
    pub suppressed: usize,
}

impl PullOutcome {
    pub fn changed_replica(&self) -> bool {
        self.applied > 0
    }
}

/// Manages synchronization of one document with its delta log.
pub struct SyncManager {
    document_id: String,
    editor_id: EditorId,
    author: String,
    config: SyncConfig,
    confirmed: Delta,
    watermark: ServerTimestamp,
    buffer: LocalEditBuffer,
    history: History,
    consecutive_failures: u32,
    degraded: bool,
    /// Set by the first record that does not fit; merging has stopped.
    protocol_error: Option<String>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncManager {
    /// Start from a snapshot; its timestamp is the initial watermark.
    pub fn new(
        document_id: impl Into<String>,
        editor_id: EditorId,
        author: impl Into<String>,
        snapshot: DocumentSnapshot,
        config: SyncConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            document_id: document_id.into(),
            editor_id,
            author: author.into(),
            confirmed: snapshot.ops,
            watermark: snapshot.snapshot_timestamp,
            buffer: LocalEditBuffer::new(),
            history: History::new(snapshot.snapshot_timestamp, config.history_limit),
            consecutive_failures: 0,
            degraded: false,
            protocol_error: None,
            config,
            event_tx,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn editor_id(&self) -> &EditorId {
        &self.editor_id
    }

    /// Get the sync configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn watermark(&self) -> ServerTimestamp {
        self.watermark
    }

    /// The document as committed up to the watermark.
    pub fn confirmed(&self) -> &Delta {
        &self.confirmed
    }

    pub fn buffer(&self) -> &LocalEditBuffer {
        &self.buffer
    }

    pub fn flush_state(&self) -> FlushState {
        self.buffer.state()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// The protocol error that stopped merging, if any.
    pub fn protocol_error(&self) -> Option<&str> {
        self.protocol_error.as_deref()
    }

    /// Subscribe to sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<SyncEvent> {
        self.event_tx.clone()
    }

    /// Record a user edit already applied to the replica.
    pub fn record_local_edit(&mut self, edit: &Delta) {
        self.buffer.push(edit);
    }

    // === Flush side ===

    /// The record to append on this tick, if any.
    pub fn begin_flush(&mut self) -> Option<DeltaRecord> {
        let editor_id = self.editor_id.clone();
        let author = self.author.clone();
        let base = self.watermark;

        let record = self
            .buffer
            .next_record(|ops| DeltaRecord::new(editor_id, author, Some(base), ops))?;
        debug!(
            document_id = %self.document_id,
            record_id = %record.id,
            base = %base,
            "Flushing local edits"
        );
        Some(record)
    }

    /// Feed back the result of appending `record_id`.
    ///
    /// On failure the record stays in flight and is resent by the next
    /// [`begin_flush`](Self::begin_flush).
    pub fn complete_flush(
        &mut self,
        record_id: &RecordId,
        result: std::result::Result<RecordId, StoreError>,
    ) {
        match result {
            Ok(_) => {
                if !self.buffer.acknowledge(record_id) {
                    trace!(record_id = %record_id, "Append acknowledged after echo");
                }
                self.record_store_success();
            }
            Err(err) => {
                self.buffer.fail(record_id);
                self.record_store_failure(&err);
            }
        }
    }

    /// Flush directly against `log`, without a session.
    pub async fn flush<L>(&mut self, log: &L) -> Result<Option<RecordId>>
    where
        L: RemoteDeltaLog + ?Sized,
    {
        let Some(record) = self.begin_flush() else {
            return Ok(None);
        };
        let record_id = record.id.clone();
        let result = log.append(record).await;
        self.complete_flush(&record_id, result.clone());
        result.map(Some).map_err(SdkError::from)
    }

    pub fn record_store_success(&mut self) {
        self.consecutive_failures = 0;
        if self.degraded {
            self.degraded = false;
            info!(document_id = %self.document_id, "Sync recovered");
            let _ = self.event_tx.send(SyncEvent::Recovered);
        }
    }

    pub fn record_store_failure(&mut self, err: &StoreError) {
        self.consecutive_failures += 1;
        debug!(
            document_id = %self.document_id,
            failures = self.consecutive_failures,
            error = %err,
            "Store call failed, retrying next tick"
        );

        if !self.degraded && self.consecutive_failures >= self.config.max_consecutive_failures {
            self.degraded = true;
            warn!(
                document_id = %self.document_id,
                failures = self.consecutive_failures,
                error = %err,
                "Sync degraded"
            );
            let _ = self.event_tx.send(SyncEvent::Degraded {
                consecutive_failures: self.consecutive_failures,
                error: err.to_string(),
            });
        }
    }

    // === Pull side ===

    /// Read records after the watermark from `log` and merge them.
    pub async fn pull<L, R>(&mut self, log: &L, replica: &mut R) -> Result<PullOutcome>
    where
        L: RemoteDeltaLog + ?Sized,
        R: DocumentReplica + ?Sized,
    {
        let records = match log.records_since(self.watermark).await {
            Ok(records) => {
                self.record_store_success();
                records
            }
            Err(err) => {
                self.record_store_failure(&err);
                return Err(err.into());
            }
        };
        self.ingest_from(log, &records, replica).await
    }

    /// Merge a batch like [`ingest`](Self::ingest). If a record needs
    /// applied records this replica has pruned, the history is rebuilt from
    /// `log` and the batch merged again.
    pub async fn ingest_from<L, R>(
        &mut self,
        log: &L,
        records: &[DeltaRecord],
        replica: &mut R,
    ) -> Result<PullOutcome>
    where
        L: RemoteDeltaLog + ?Sized,
        R: DocumentReplica + ?Sized,
    {
        match self.ingest(records, replica) {
            Err(SdkError::HistoryTruncated { .. }) => {
                self.rebuild_history(log).await?;
                self.ingest(records, replica).map_err(|err| {
                    if matches!(err, SdkError::HistoryTruncated { .. }) {
                        self.halt(&err);
                    }
                    err
                })
            }
            other => other,
        }
    }

    /// Recompute the applied forms of everything up to the watermark from
    /// the log's latest snapshot.
    pub async fn rebuild_history<L>(&mut self, log: &L) -> Result<()>
    where
        L: RemoteDeltaLog + ?Sized,
    {
        let snapshot = match log.latest_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.record_store_failure(&err);
                return Err(err.into());
            }
        };
        let records = match log.records_since(snapshot.snapshot_timestamp).await {
            Ok(records) => records,
            Err(err) => {
                self.record_store_failure(&err);
                return Err(err.into());
            }
        };
        self.record_store_success();

        let (contents, history) = History::replay(
            &snapshot.ops,
            snapshot.snapshot_timestamp,
            &records,
            self.watermark,
            self.config.history_limit,
        )?;
        if contents != self.confirmed {
            warn!(
                document_id = %self.document_id,
                snapshot = %snapshot.snapshot_timestamp,
                watermark = %self.watermark,
                "Replayed log disagrees with the confirmed document"
            );
        }
        info!(
            document_id = %self.document_id,
            floor = %history.floor(),
            entries = history.len(),
            "Rebuilt rebase history from the log"
        );
        self.history = history;
        Ok(())
    }

    /// Merge a batch of records (typically a subscription snapshot).
    ///
    /// Local edits are undone, committed records applied in timestamp order,
    /// and the local edits rebased and reapplied; the replica sees this as
    /// one change. On a protocol error nothing changes.
    pub fn ingest<R>(&mut self, records: &[DeltaRecord], replica: &mut R) -> Result<PullOutcome>
    where
        R: DocumentReplica + ?Sized,
    {
        let mut outcome = PullOutcome::default();
        let mut fresh: Vec<(ServerTimestamp, &DeltaRecord)> = Vec::new();
        let mut seen: HashSet<&RecordId> = HashSet::new();

        for record in records {
            match record.timestamp {
                None => {
                    trace!(record_id = %record.id, "Deferring uncommitted record");
                    outcome.deferred += 1;
                }
                Some(ts)
                    if ts <= self.watermark
                        || self.history.contains(&record.id)
                        || !seen.insert(&record.id) =>
                {
                    outcome.stale += 1;
                }
                Some(ts) => fresh.push((ts, record)),
            }
        }
        if fresh.is_empty() {
            return Ok(outcome);
        }
        fresh.sort_by_key(|(ts, _)| *ts);

        match self.merge(&fresh, replica, &mut outcome) {
            Ok(()) => Ok(outcome),
            Err(err @ SdkError::HistoryTruncated { .. }) => {
                debug!(document_id = %self.document_id, error = %err, "Batch needs pruned history");
                Err(err)
            }
            Err(err) => {
                self.halt(&err);
                Err(err)
            }
        }
    }

    /// Record the first protocol error; later ones are only logged.
    fn halt(&mut self, err: &SdkError) {
        if self.protocol_error.is_some() {
            debug!(document_id = %self.document_id, error = %err, "Pull still blocked");
            return;
        }
        error!(
            document_id = %self.document_id,
            error = %err,
            "Aborting pull: record does not fit the document"
        );
        self.protocol_error = Some(err.to_string());
        let _ = self.event_tx.send(SyncEvent::ProtocolError {
            error: err.to_string(),
        });
    }

    fn merge<R>(
        &mut self,
        fresh: &[(ServerTimestamp, &DeltaRecord)],
        replica: &mut R,
        outcome: &mut PullOutcome,
    ) -> Result<()>
    where
        R: DocumentReplica + ?Sized,
    {
        // Work on copies; state is only committed once everything fits.
        let mut confirmed = self.confirmed.clone();
        let mut buffer = self.buffer.clone();
        let mut staged: Vec<AppliedRecord> = Vec::new();

        let mut steps = vec![buffer.combined().invert(&confirmed)?];

        for &(timestamp, record) in fresh {
            let applied = if record.editor_id == self.editor_id {
                match buffer.confirm(&record.id) {
                    Some(delta) => {
                        outcome.confirmed = Some(record.id.clone());
                        delta
                    }
                    None => {
                        trace!(record_id = %record.id, "Suppressing own record");
                        outcome.suppressed += 1;
                        continue;
                    }
                }
            } else {
                let rebased = self.history.rebase(record, &staged);
                if rebased.truncated {
                    return Err(SdkError::HistoryTruncated {
                        record_id: record.id.clone(),
                        base: record.base_timestamp.unwrap_or_default(),
                        floor: self.history.floor(),
                    });
                }
                buffer.rebase(&rebased.delta);
                outcome.applied += 1;
                rebased.delta
            };

            confirmed = applied.apply_to(&confirmed)?;
            steps.push(applied.clone());
            staged.push(AppliedRecord {
                id: record.id.clone(),
                timestamp,
                delta: applied,
            });
        }
        steps.push(buffer.combined());

        if outcome.changed_replica() {
            let net = steps.iter().fold(Delta::new(), |net, step| net.compose(step));
            let selection = replica.get_selection().map(|range| {
                steps
                    .iter()
                    .fold(range, |range: TextRange, step| range.transform(step))
            });
            replica.update_contents(&net, ChangeSource::Sync)?;
            replica.set_selection(selection);
        }

        // Commit.
        for entry in staged {
            self.history.push(entry);
        }
        self.confirmed = confirmed;
        self.buffer = buffer;
        if let Some(&(last, _)) = fresh.last() {
            self.watermark = last;
        }

        if let Some(record_id) = &outcome.confirmed {
            debug!(document_id = %self.document_id, record_id = %record_id, "Flush confirmed");
            let _ = self.event_tx.send(SyncEvent::Flushed {
                record_id: record_id.clone(),
                timestamp: self.timestamp_of(record_id, fresh),
            });
        }
        if outcome.applied > 0 {
            debug!(
                document_id = %self.document_id,
                records = outcome.applied,
                watermark = %self.watermark,
                "Merged remote records"
            );
            let _ = self.event_tx.send(SyncEvent::RemoteApplied {
                records: outcome.applied,
                watermark: self.watermark,
            });
        }
        Ok(())
    }

    fn timestamp_of(
        &self,
        record_id: &RecordId,
        fresh: &[(ServerTimestamp, &DeltaRecord)],
    ) -> ServerTimestamp {
        fresh
            .iter()
            .find(|(_, record)| record.id == *record_id)
            .map_or(self.watermark, |(ts, _)| *ts)
    }

    /// The current document as this replica should show it.
    pub fn expected_contents(&self) -> Result<Delta> {
        Ok(self.buffer.combined().apply_to(&self.confirmed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RichTextDoc;
    use crate::store::MemoryDeltaLog;

    fn manager(editor: &str) -> SyncManager {
        SyncManager::new(
            "doc-1",
            EditorId::new(editor),
            editor,
            DocumentSnapshot::empty(),
            SyncConfig::default(),
        )
    }

    fn remote(editor: &str, ts: u64, base: Option<u64>, ops: Delta) -> DeltaRecord {
        DeltaRecord::new(EditorId::new(editor), editor, base.map(ServerTimestamp), ops)
            .committed_at(ServerTimestamp(ts))
    }

    fn insert_at(index: usize, text: &str) -> Delta {
        let mut delta = Delta::new();
        delta.retain(index).insert(text);
        delta
    }

    #[test]
    fn test_sync_config_builder() {
        let config = SyncConfigBuilder::new()
            .flush_interval(500)
            .reconcile_interval(250)
            .max_consecutive_failures(3)
            .history_limit(64)
            .event_capacity(10)
            .auto_sync(false)
            .build();

        assert_eq!(config.flush_interval_ms, 500);
        assert_eq!(config.reconcile_interval_ms, 250);
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.history_limit, 64);
        assert_eq!(config.event_capacity, 10);
        assert!(!config.auto_sync);
    }

    #[test]
    fn test_sync_config_from_partial_json() {
        let config: SyncConfig = serde_json::from_str(r#"{"flush_interval_ms": 250}"#).unwrap();
        assert_eq!(config.flush_interval_ms, 250);
        assert_eq!(config.history_limit, 4096);
    }

    #[test]
    fn test_empty_buffer_flushes_nothing() {
        let mut sync = manager("a");
        assert!(sync.begin_flush().is_none());
        assert_eq!(sync.flush_state(), FlushState::Idle);
    }

    #[test]
    fn test_record_carries_watermark_as_base() {
        let mut sync = manager("a");
        let mut doc = RichTextDoc::new("doc-1");
        sync.ingest(&[remote("b", 3, None, insert_at(0, "x"))], &mut doc)
            .unwrap();

        let edit = doc.insert_text(0, "y", None).unwrap();
        sync.record_local_edit(&edit);
        let record = sync.begin_flush().unwrap();

        assert_eq!(record.base_timestamp, Some(ServerTimestamp(3)));
        assert_eq!(record.timestamp, None);
        assert_eq!(record.author, "a");
    }

    #[test]
    fn test_stale_and_uncommitted_records() {
        let mut sync = manager("a");
        let mut doc = RichTextDoc::new("doc-1");
        let first = remote("b", 1, None, insert_at(0, "x"));
        sync.ingest(&[first.clone()], &mut doc).unwrap();

        let pending = DeltaRecord::new(EditorId::new("b"), "b", None, insert_at(0, "y"));
        let outcome = sync.ingest(&[first, pending], &mut doc).unwrap();

        assert_eq!(outcome.stale, 1);
        assert_eq!(outcome.deferred, 1);
        assert_eq!(outcome.applied, 0);
        assert_eq!(doc.get_text(), "x\n");
        assert_eq!(sync.watermark(), ServerTimestamp(1));
    }

    #[test]
    fn test_duplicate_ids_in_one_batch_apply_once() {
        let mut sync = manager("a");
        let mut doc = RichTextDoc::new("doc-1");
        let record = remote("b", 1, None, insert_at(0, "x"));

        let outcome = sync.ingest(&[record.clone(), record], &mut doc).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.stale, 1);
        assert_eq!(doc.get_text(), "x\n");
    }

    #[test]
    fn test_protocol_error_leaves_state_untouched() {
        let mut sync = manager("a");
        let mut doc = RichTextDoc::new("doc-1");
        let mut events = sync.subscribe();

        let mut bad = Delta::new();
        bad.retain(10).insert("x");
        let result = sync.ingest(&[remote("b", 1, None, bad)], &mut doc);

        assert!(matches!(result, Err(SdkError::Protocol(_))));
        assert_eq!(sync.watermark(), ServerTimestamp::ZERO);
        assert_eq!(doc.get_text(), "\n");
        assert!(matches!(
            events.try_recv(),
            Ok(SyncEvent::ProtocolError { .. })
        ));
    }

    #[test]
    fn test_protocol_error_is_reported_once() {
        let mut sync = manager("a");
        let mut doc = RichTextDoc::new("doc-1");
        let mut events = sync.subscribe();

        let mut bad = Delta::new();
        bad.retain(10).insert("x");
        let bad = remote("b", 1, None, bad);
        let next = remote("b", 2, None, insert_at(0, "y"));

        assert!(sync.ingest(&[bad.clone()], &mut doc).is_err());
        assert!(sync.ingest(&[bad, next], &mut doc).is_err());

        assert!(sync.protocol_error().is_some());
        assert!(matches!(
            events.try_recv(),
            Ok(SyncEvent::ProtocolError { .. })
        ));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_pruned_history_is_reported_not_guessed() {
        let mut sync = SyncManager::new(
            "doc-1",
            EditorId::new("a"),
            "a",
            DocumentSnapshot::empty(),
            SyncConfigBuilder::new().history_limit(1).build(),
        );
        let mut doc = RichTextDoc::new("doc-1");
        sync.ingest(&[remote("b", 1, Some(0), insert_at(0, "Hello"))], &mut doc)
            .unwrap();
        sync.ingest(&[remote("b", 2, Some(1), insert_at(5, "!"))], &mut doc)
            .unwrap();

        let late = remote("c", 3, Some(0), insert_at(0, ">"));
        let result = sync.ingest(&[late], &mut doc);

        assert!(matches!(
            result,
            Err(SdkError::HistoryTruncated {
                base: ServerTimestamp(0),
                floor: ServerTimestamp(1),
                ..
            })
        ));
        assert_eq!(doc.get_text(), "Hello!\n");
        assert_eq!(sync.watermark(), ServerTimestamp(2));
        assert!(sync.protocol_error().is_none());
    }

    #[test]
    fn test_selection_follows_remote_insert() {
        let mut sync = manager("a");
        let mut doc = RichTextDoc::new("doc-1");
        sync.ingest(&[remote("b", 1, None, insert_at(0, "Hello"))], &mut doc)
            .unwrap();
        doc.set_selection(Some(TextRange::caret(5)));

        sync.ingest(&[remote("b", 2, Some(1), insert_at(0, "xyz"))], &mut doc)
            .unwrap();
        assert_eq!(doc.get_selection(), Some(TextRange::caret(8)));
    }

    #[tokio::test]
    async fn test_degraded_after_repeated_failures() {
        let log = MemoryDeltaLog::new();
        let mut sync = SyncManager::new(
            "doc-1",
            EditorId::new("a"),
            "a",
            DocumentSnapshot::empty(),
            SyncConfigBuilder::new().max_consecutive_failures(2).build(),
        );
        let mut events = sync.subscribe();
        sync.record_local_edit(&insert_at(0, "x"));

        log.fail_next(2);
        assert!(sync.flush(&log).await.is_err());
        assert!(!sync.is_degraded());
        assert!(sync.flush(&log).await.is_err());
        assert!(sync.is_degraded());
        assert_eq!(sync.flush_state(), FlushState::Retrying);

        assert!(sync.flush(&log).await.unwrap().is_some());
        assert!(!sync.is_degraded());
        assert_eq!(log.records().len(), 1);

        assert!(matches!(
            events.try_recv(),
            Ok(SyncEvent::Degraded {
                consecutive_failures: 2,
                ..
            })
        ));
        assert!(matches!(events.try_recv(), Ok(SyncEvent::Recovered)));
    }
}
