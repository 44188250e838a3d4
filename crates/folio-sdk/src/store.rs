//! Store abstractions the sync engine talks to, plus in-memory fakes.
//!
//! [`RemoteDeltaLog`] is the append-only, timestamp-ordered log of changes
//! for one document. [`HighlightStore`] is the keyed collection of highlight
//! records for one document. The memory implementations are used by tests,
//! the simulator and the stress binary; they can be told to fail or to hold
//! appends uncommitted.

use crate::error::StoreError;
use async_trait::async_trait;
use folio_db::{
    DeltaRecord, DocumentSnapshot, Highlight, HighlightFields, HighlightId, RecordId,
    ServerTimestamp,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Full-prefix snapshots of the log: every delivery holds all records after
/// the subscription's starting timestamp, including ones already delivered.
pub type RecordStream = mpsc::UnboundedReceiver<Vec<DeltaRecord>>;

/// Every delivery holds all highlights currently in the store.
pub type HighlightStream = mpsc::UnboundedReceiver<Vec<Highlight>>;

/// Append-only delta log for one document.
#[async_trait]
pub trait RemoteDeltaLog: Send + Sync + 'static {
    /// Append a record. The log assigns its timestamp on commit.
    ///
    /// Appending a record ID the log already holds is a no-op returning the
    /// same ID, so a failed append can be retried with the same record.
    async fn append(&self, record: DeltaRecord) -> Result<RecordId, StoreError>;

    /// Subscribe to records after `since`. Dropping the receiver unsubscribes.
    async fn subscribe(&self, since: ServerTimestamp) -> Result<RecordStream, StoreError>;

    /// One-shot read of the records after `since`.
    async fn records_since(&self, since: ServerTimestamp) -> Result<Vec<DeltaRecord>, StoreError>;

    /// The latest compaction checkpoint.
    async fn latest_snapshot(&self) -> Result<DocumentSnapshot, StoreError>;

    /// Replace the compaction checkpoint.
    async fn write_snapshot(&self, snapshot: DocumentSnapshot) -> Result<(), StoreError>;
}

/// Keyed highlight collection for one document.
#[async_trait]
pub trait HighlightStore: Send + Sync + 'static {
    /// Write `fields` under `id`. With `merge` the fields patch the existing
    /// record; without it they replace it and must be complete.
    async fn set(
        &self,
        id: &HighlightId,
        fields: HighlightFields,
        merge: bool,
    ) -> Result<(), StoreError>;

    async fn delete(&self, id: &HighlightId) -> Result<(), StoreError>;

    /// Watch the collection. Dropping the receiver unsubscribes.
    async fn on_snapshot(&self) -> Result<HighlightStream, StoreError>;
}

// ============================================================================
// Memory delta log
// ============================================================================

struct Subscriber {
    since: ServerTimestamp,
    tx: mpsc::UnboundedSender<Vec<DeltaRecord>>,
}

struct LogState {
    records: Vec<DeltaRecord>,
    snapshot: DocumentSnapshot,
    clock: ServerTimestamp,
    staging: bool,
    fail_appends: usize,
    subscribers: Vec<Subscriber>,
}

impl LogState {
    /// Records after `since`, uncommitted ones included.
    fn visible(&self, since: ServerTimestamp) -> Vec<DeltaRecord> {
        self.records
            .iter()
            .filter(|record| record.timestamp.map_or(true, |ts| ts > since))
            .cloned()
            .collect()
    }

    fn notify(&mut self) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        subscribers.retain(|sub| sub.tx.send(self.visible(sub.since)).is_ok());
        self.subscribers = subscribers;
    }

    fn commit(&mut self, mut record: DeltaRecord) -> DeltaRecord {
        self.clock = self.clock.next();
        record.timestamp = Some(self.clock);
        record
    }
}

/// In-memory delta log for testing and simulation.
#[derive(Clone)]
pub struct MemoryDeltaLog {
    state: Arc<RwLock<LogState>>,
}

impl MemoryDeltaLog {
    pub fn new() -> Self {
        Self::with_snapshot(DocumentSnapshot::empty())
    }

    /// A log whose history starts at `snapshot`.
    pub fn with_snapshot(snapshot: DocumentSnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(LogState {
                records: Vec::new(),
                clock: snapshot.snapshot_timestamp,
                snapshot,
                staging: false,
                fail_appends: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Fail the next `count` appends with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.state.write().fail_appends = count;
    }

    /// While staging, appends are accepted and visible to subscribers but
    /// carry no timestamp until [`commit_staged`](Self::commit_staged).
    pub fn set_staging(&self, staging: bool) {
        self.state.write().staging = staging;
    }

    /// Timestamp every staged record, in append order.
    pub fn commit_staged(&self) -> usize {
        let mut state = self.state.write();
        let staged: Vec<usize> = state
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.timestamp.is_none())
            .map(|(i, _)| i)
            .collect();

        for &i in &staged {
            state.clock = state.clock.next();
            let ts = state.clock;
            state.records[i].timestamp = Some(ts);
        }
        state.records.sort_by_key(|record| record.timestamp);
        if !staged.is_empty() {
            state.notify();
        }
        staged.len()
    }

    /// Every retained record, in log order.
    pub fn records(&self) -> Vec<DeltaRecord> {
        self.state.read().records.clone()
    }

    /// Timestamp of the newest committed record.
    pub fn head(&self) -> ServerTimestamp {
        self.state.read().clock
    }

    /// Close every open subscription, as a dropped connection would.
    pub fn drop_subscribers(&self) {
        self.state.write().subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.write();
        state.subscribers.retain(|sub| !sub.tx.is_closed());
        state.subscribers.len()
    }
}

impl Default for MemoryDeltaLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteDeltaLog for MemoryDeltaLog {
    async fn append(&self, record: DeltaRecord) -> Result<RecordId, StoreError> {
        let mut state = self.state.write();

        if state.fail_appends > 0 {
            state.fail_appends -= 1;
            return Err(StoreError::Unavailable("injected append failure".into()));
        }
        if record.timestamp.is_some() {
            return Err(StoreError::InvalidRecord(format!(
                "record {} already carries a timestamp",
                record.id
            )));
        }
        if state.records.iter().any(|existing| existing.id == record.id) {
            return Ok(record.id);
        }
        // Replicas loading the snapshot could not rebase such a record.
        if let Some(base) = record.base_timestamp {
            if base < state.snapshot.snapshot_timestamp {
                return Err(StoreError::InvalidRecord(format!(
                    "record {} is based at {}, below the snapshot at {}",
                    record.id, base, state.snapshot.snapshot_timestamp
                )));
            }
        }

        let id = record.id.clone();
        let record = if state.staging {
            record
        } else {
            state.commit(record)
        };
        state.records.push(record);
        state.notify();
        Ok(id)
    }

    async fn subscribe(&self, since: ServerTimestamp) -> Result<RecordStream, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write();

        let initial = state.visible(since);
        if !initial.is_empty() {
            tx.send(initial).map_err(|_| StoreError::Closed)?;
        }
        state.subscribers.push(Subscriber { since, tx });
        Ok(rx)
    }

    async fn records_since(&self, since: ServerTimestamp) -> Result<Vec<DeltaRecord>, StoreError> {
        Ok(self.state.read().visible(since))
    }

    async fn latest_snapshot(&self) -> Result<DocumentSnapshot, StoreError> {
        Ok(self.state.read().snapshot.clone())
    }

    async fn write_snapshot(&self, snapshot: DocumentSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if snapshot.snapshot_timestamp < state.snapshot.snapshot_timestamp
            || snapshot.snapshot_timestamp > state.clock
        {
            return Err(StoreError::InvalidRecord(format!(
                "snapshot at {} outside ({}, {}]",
                snapshot.snapshot_timestamp, state.snapshot.snapshot_timestamp, state.clock
            )));
        }

        let upto = snapshot.snapshot_timestamp;
        state
            .records
            .retain(|record| record.timestamp.map_or(true, |ts| ts > upto));
        state.snapshot = snapshot;
        Ok(())
    }
}

// ============================================================================
// Memory highlight store
// ============================================================================

#[derive(Default)]
struct HighlightState {
    highlights: BTreeMap<HighlightId, Highlight>,
    fail_writes: usize,
    writes: usize,
    watchers: Vec<mpsc::UnboundedSender<Vec<Highlight>>>,
}

impl HighlightState {
    fn check_failure(&mut self) -> Result<(), StoreError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn written(&mut self) {
        self.writes += 1;
        let all: Vec<Highlight> = self.highlights.values().cloned().collect();
        self.watchers.retain(|tx| tx.send(all.clone()).is_ok());
    }
}

/// In-memory highlight store for testing and simulation.
#[derive(Clone, Default)]
pub struct MemoryHighlightStore {
    state: Arc<RwLock<HighlightState>>,
}

impl MemoryHighlightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.state.write().fail_writes = count;
    }

    /// Number of successful `set`/`delete` calls so far.
    pub fn write_count(&self) -> usize {
        self.state.read().writes
    }

    pub fn get(&self, id: &HighlightId) -> Option<Highlight> {
        self.state.read().highlights.get(id).cloned()
    }

    pub fn all(&self) -> Vec<Highlight> {
        self.state.read().highlights.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().highlights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().highlights.is_empty()
    }
}

#[async_trait]
impl HighlightStore for MemoryHighlightStore {
    async fn set(
        &self,
        id: &HighlightId,
        fields: HighlightFields,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.check_failure()?;

        if merge {
            if let Some(existing) = state.highlights.get_mut(id) {
                fields.apply_to(existing);
                state.written();
                return Ok(());
            }
        }

        let highlight = fields
            .into_highlight(id.clone())
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        state.highlights.insert(id.clone(), highlight);
        state.written();
        Ok(())
    }

    async fn delete(&self, id: &HighlightId) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.check_failure()?;

        state.highlights.remove(id);
        state.written();
        Ok(())
    }

    async fn on_snapshot(&self) -> Result<HighlightStream, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write();

        let all: Vec<Highlight> = state.highlights.values().cloned().collect();
        tx.send(all).map_err(|_| StoreError::Closed)?;
        state.watchers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_db::{EditorId, TagId};
    use folio_delta::{Delta, TextRange};

    fn record(text: &str) -> DeltaRecord {
        let mut ops = Delta::new();
        ops.insert(text);
        DeltaRecord::new(EditorId::new("ed"), "alice", None, ops)
    }

    fn highlight(id: &str) -> Highlight {
        Highlight {
            id: HighlightId::new(id),
            document_id: "doc".into(),
            tag_id: TagId::new("T1"),
            selection: TextRange::new(0, 2),
            text: "He".into(),
            creation_timestamp: 1,
            last_update_timestamp: 1,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_timestamps() {
        let log = MemoryDeltaLog::new();
        log.append(record("a")).await.unwrap();
        log.append(record("b")).await.unwrap();

        let records = log.records_since(ServerTimestamp::ZERO).await.unwrap();
        assert_eq!(records[0].timestamp, Some(ServerTimestamp(1)));
        assert_eq!(records[1].timestamp, Some(ServerTimestamp(2)));
        assert_eq!(log.head(), ServerTimestamp(2));
    }

    #[tokio::test]
    async fn test_append_is_idempotent_per_id() {
        let log = MemoryDeltaLog::new();
        let r = record("a");
        let first = log.append(r.clone()).await.unwrap();
        let second = log.append(r).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(log.records().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_pre_timestamped_record() {
        let log = MemoryDeltaLog::new();
        let result = log.append(record("a").committed_at(ServerTimestamp(9))).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
    }

    #[test]
    fn test_injected_failures() {
        let log = MemoryDeltaLog::new();
        log.fail_next(1);

        tokio_test::block_on(async {
            assert!(matches!(
                log.append(record("a")).await,
                Err(StoreError::Unavailable(_))
            ));
            assert!(log.append(record("a")).await.is_ok());
        });
    }

    #[tokio::test]
    async fn test_rejects_record_based_below_snapshot() {
        let log = MemoryDeltaLog::with_snapshot(DocumentSnapshot::new(
            Delta::from_text("a\n"),
            ServerTimestamp(4),
        ));
        let mut ops = Delta::new();
        ops.insert("x");

        let stale = DeltaRecord::new(EditorId::new("ed"), "alice", Some(ServerTimestamp(3)), ops.clone());
        assert!(matches!(
            log.append(stale).await,
            Err(StoreError::InvalidRecord(_))
        ));

        let current = DeltaRecord::new(EditorId::new("ed"), "alice", Some(ServerTimestamp(4)), ops);
        assert!(log.append(current).await.is_ok());
        assert_eq!(log.head(), ServerTimestamp(5));
    }

    #[tokio::test]
    async fn test_dropped_subscribers_see_end_of_stream() {
        let log = MemoryDeltaLog::new();
        let mut rx = log.subscribe(ServerTimestamp::ZERO).await.unwrap();

        log.drop_subscribers();
        assert!(rx.recv().await.is_none());
        assert_eq!(log.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_delivers_full_prefix() {
        let log = MemoryDeltaLog::new();
        log.append(record("a")).await.unwrap();

        let mut rx = log.subscribe(ServerTimestamp::ZERO).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 1);

        log.append(record("b")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 2);

        drop(rx);
        assert_eq!(log.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_staged_records_lack_timestamps() {
        let log = MemoryDeltaLog::new();
        log.set_staging(true);
        log.append(record("a")).await.unwrap();

        let visible = log.records_since(ServerTimestamp::ZERO).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert!(!visible[0].is_committed());

        assert_eq!(log.commit_staged(), 1);
        assert_eq!(log.records()[0].timestamp, Some(ServerTimestamp(1)));
    }

    #[tokio::test]
    async fn test_snapshot_prunes_covered_records() {
        let log = MemoryDeltaLog::new();
        log.append(record("a")).await.unwrap();
        log.append(record("b")).await.unwrap();

        let snapshot = DocumentSnapshot::new(Delta::from_text("a\n"), ServerTimestamp(1));
        log.write_snapshot(snapshot.clone()).await.unwrap();

        assert_eq!(log.latest_snapshot().await.unwrap(), snapshot);
        assert_eq!(log.records().len(), 1);

        let stale = DocumentSnapshot::new(Delta::from_text("\n"), ServerTimestamp::ZERO);
        assert!(log.write_snapshot(stale).await.is_err());
    }

    #[tokio::test]
    async fn test_highlight_set_and_merge() {
        let store = MemoryHighlightStore::new();
        let h = highlight("h1");
        store
            .set(&h.id, HighlightFields::from(h.clone()), false)
            .await
            .unwrap();

        let patch = HighlightFields {
            text: Some("Hi".into()),
            ..Default::default()
        };
        store.set(&h.id, patch, true).await.unwrap();

        assert_eq!(store.get(&h.id).unwrap().text, "Hi");
        assert_eq!(store.get(&h.id).unwrap().tag_id, TagId::new("T1"));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_highlight_merge_onto_missing_requires_full_record() {
        let store = MemoryHighlightStore::new();
        let patch = HighlightFields {
            text: Some("Hi".into()),
            ..Default::default()
        };

        let result = store.set(&HighlightId::new("ghost"), patch, true).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_highlight_snapshots() {
        let store = MemoryHighlightStore::new();
        let mut rx = store.on_snapshot().await.unwrap();
        assert!(rx.recv().await.unwrap().is_empty());

        let h = highlight("h1");
        store.set(&h.id, h.clone().into(), false).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![h.clone()]);

        store.delete(&h.id).await.unwrap();
        assert!(rx.recv().await.unwrap().is_empty());
    }
}
