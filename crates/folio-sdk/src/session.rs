//! Document sessions: one open document driven by two background tasks.
//!
//! The sync task owns the replica and the [`SyncManager`]. It is the only
//! place either is touched, and it reacts to the flush tick, subscription
//! snapshots, append results and editor commands one at a time. The
//! reconcile task runs the [`HighlightReconciler`] on its own tick against
//! the contents the sync task publishes.
//!
//! A subscription that ends is counted as a store failure and reopened from
//! the watermark on the next flush tick. A record that does not fit the
//! document stops the pull side for good; [`DocumentState::protocol_error`]
//! shows why.
//!
//! [`DocumentSession::close`] stops both tasks. Each drops its store
//! subscription on the way out, before the replica is discarded.

use crate::buffer::FlushState;
use crate::document::{DocumentReplica, RichTextDoc};
use crate::error::{Result, SdkError, StoreError};
use crate::reconciler::{HighlightReconciler, ReconcileOutcome};
use crate::store::{HighlightStore, HighlightStream, RecordStream, RemoteDeltaLog};
use crate::sync::{SyncConfig, SyncEvent, SyncManager};
use folio_db::{DeltaRecord, EditorId, HighlightId, RecordId, ServerTimestamp, TagId};
use folio_delta::{AttributeMap, Delta, TextRange};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

/// Runs an edit on the replica; returns the user delta it applied, if any.
type EditFn = Box<dyn FnOnce(&mut RichTextDoc) -> Option<Delta> + Send>;

type AppendResult = (RecordId, std::result::Result<RecordId, StoreError>);

enum Command {
    Edit(EditFn),
    Select {
        range: Option<TextRange>,
        reply: oneshot::Sender<()>,
    },
    State {
        reply: oneshot::Sender<DocumentState>,
    },
    Flush {
        reply: oneshot::Sender<Option<RecordId>>,
    },
}

/// A point-in-time view of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentState {
    pub contents: Delta,
    pub selection: Option<TextRange>,
    pub watermark: ServerTimestamp,
    pub flush_state: FlushState,
    /// No local edits awaiting confirmation.
    pub settled: bool,
    pub degraded: bool,
    /// Set once a record failed to merge; no further records are pulled.
    pub protocol_error: Option<String>,
}

impl DocumentState {
    pub fn text(&self) -> String {
        self.contents.text()
    }
}

/// Handle to an open document. Cheap to clone; all clones talk to the same
/// tasks.
#[derive(Clone)]
pub struct DocumentSession {
    document_id: String,
    editor_id: EditorId,
    commands: mpsc::Sender<Command>,
    reconcile_requests: mpsc::Sender<oneshot::Sender<ReconcileOutcome>>,
    contents: watch::Receiver<Delta>,
    events: broadcast::Sender<SyncEvent>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl DocumentSession {
    /// Load the document from the log's latest snapshot, subscribe to the
    /// log and the highlight store, and start the session tasks.
    pub async fn open(
        document_id: impl Into<String>,
        author: impl Into<String>,
        log: Arc<dyn RemoteDeltaLog>,
        highlights: Arc<dyn HighlightStore>,
        config: SyncConfig,
    ) -> Result<Self> {
        let document_id = document_id.into();
        let editor_id = EditorId::generate();
        let span = info_span!("document", document_id = %document_id, editor_id = %editor_id);

        let snapshot = log.latest_snapshot().await?;
        let since = snapshot.snapshot_timestamp;
        let replica = RichTextDoc::from_snapshot(document_id.clone(), &snapshot);
        let sync = SyncManager::new(
            document_id.clone(),
            editor_id.clone(),
            author,
            snapshot,
            config.clone(),
        );

        let subscription = log.subscribe(since).await?;
        let mut highlight_feed = highlights.on_snapshot().await?;
        let mut reconciler = HighlightReconciler::new(document_id.clone(), highlights);
        while let Ok(initial) = highlight_feed.try_recv() {
            reconciler.load(initial);
        }

        let events = sync.event_sender();
        let (contents_tx, contents_rx) = watch::channel(replica.get_contents().clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(64);
        let (reconcile_tx, reconcile_rx) = mpsc::channel(8);

        let actor = SyncActor {
            replica,
            sync,
            log,
            subscription: Some(subscription),
            contents: contents_tx,
            config: config.clone(),
        };
        let sync_task = tokio::spawn(
            actor
                .run(command_rx, shutdown_rx.clone())
                .instrument(span.clone()),
        );
        let reconcile_task = tokio::spawn(
            ReconcileTask {
                reconciler,
                feed: Some(highlight_feed),
                contents: contents_rx.clone(),
                events: events.clone(),
                config,
            }
            .run(reconcile_rx, shutdown_rx)
            .instrument(span.clone()),
        );

        span.in_scope(|| info!(since = %since, "Document opened"));

        Ok(Self {
            document_id,
            editor_id,
            commands: command_tx,
            reconcile_requests: reconcile_tx,
            contents: contents_rx,
            events,
            shutdown: Arc::new(shutdown_tx),
            tasks: Arc::new(Mutex::new(vec![sync_task, reconcile_task])),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn editor_id(&self) -> &EditorId {
        &self.editor_id
    }

    /// Subscribe to sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// The latest published contents.
    pub fn contents(&self) -> Delta {
        self.contents.borrow().clone()
    }

    /// Watch the contents as they change.
    pub fn watch_contents(&self) -> watch::Receiver<Delta> {
        self.contents.clone()
    }

    /// Run a user edit on the replica.
    ///
    /// `edit` must return the delta it applied as a user change; that delta
    /// enters the local edit buffer.
    pub async fn edit<T, F>(&self, edit: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut RichTextDoc) -> Result<(T, Delta)> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let apply: EditFn = Box::new(move |doc| match edit(doc) {
            Ok((value, delta)) => {
                let _ = reply.send(Ok(value));
                Some(delta)
            }
            Err(err) => {
                let _ = reply.send(Err(err));
                None
            }
        });

        self.send(Command::Edit(apply)).await?;
        rx.await.map_err(|_| SdkError::SessionClosed)?
    }

    pub async fn insert_text(&self, index: usize, text: impl Into<String>) -> Result<Delta> {
        let text = text.into();
        self.edit(move |doc| doc.insert_text(index, &text, None).map(|d| (d.clone(), d)))
            .await
    }

    pub async fn delete_text(&self, index: usize, length: usize) -> Result<Delta> {
        self.edit(move |doc| doc.delete_text(index, length).map(|d| (d.clone(), d)))
            .await
    }

    pub async fn format_text(
        &self,
        index: usize,
        length: usize,
        attributes: AttributeMap,
    ) -> Result<Delta> {
        self.edit(move |doc| {
            doc.format_text(index, length, attributes)
                .map(|d| (d.clone(), d))
        })
        .await
    }

    pub async fn remove_format(&self, index: usize, length: usize) -> Result<Delta> {
        self.edit(move |doc| doc.remove_format(index, length).map(|d| (d.clone(), d)))
            .await
    }

    /// Tag `range` as a new highlight.
    pub async fn highlight(&self, range: TextRange, tag_id: TagId) -> Result<HighlightId> {
        self.edit(move |doc| doc.highlight(range, tag_id)).await
    }

    pub async fn set_selection(&self, range: Option<TextRange>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Select { range, reply }).await?;
        rx.await.map_err(|_| SdkError::SessionClosed)
    }

    pub async fn state(&self) -> Result<DocumentState> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State { reply }).await?;
        rx.await.map_err(|_| SdkError::SessionClosed)
    }

    /// Get the plain text content.
    pub async fn text(&self) -> Result<String> {
        Ok(self.state().await?.text())
    }

    /// Flush now instead of waiting for the tick. Returns the record sent,
    /// if there was one to send.
    pub async fn flush(&self) -> Result<Option<RecordId>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush { reply }).await?;
        rx.await.map_err(|_| SdkError::SessionClosed)
    }

    /// Reconcile highlights now instead of waiting for the tick.
    pub async fn reconcile_now(&self) -> Result<ReconcileOutcome> {
        let (reply, rx) = oneshot::channel();
        self.reconcile_requests
            .send(reply)
            .await
            .map_err(|_| SdkError::SessionClosed)?;
        rx.await.map_err(|_| SdkError::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop both tasks and wait for them. Unflushed local edits are dropped.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(document_id = %self.document_id, error = %err, "Session task failed");
            }
        }
        info!(document_id = %self.document_id, "Document closed");
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SdkError::SessionClosed)
    }
}

/// Resolves with the next snapshot, or never once unsubscribed.
async fn next_batch(subscription: &mut Option<RecordStream>) -> Option<Vec<DeltaRecord>> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_highlights(
    feed: &mut Option<HighlightStream>,
) -> Option<Vec<folio_db::Highlight>> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct SyncActor {
    replica: RichTextDoc,
    sync: SyncManager,
    log: Arc<dyn RemoteDeltaLog>,
    subscription: Option<RecordStream>,
    contents: watch::Sender<Delta>,
    config: SyncConfig,
}

impl SyncActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut flush_tick = interval(Duration::from_millis(self.config.flush_interval_ms.max(1)));
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let (append_tx, mut append_rx) = mpsc::unbounded_channel::<AppendResult>();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = flush_tick.tick(), if self.config.auto_sync => {
                    self.resubscribe().await;
                    self.start_flush(&append_tx);
                }
                batch = next_batch(&mut self.subscription) => match batch {
                    Some(records) => self.pull(&records).await,
                    None => {
                        warn!("Delta log subscription closed, reopening on the next tick");
                        self.subscription = None;
                        self.sync.record_store_failure(&StoreError::Closed);
                    }
                },
                Some((record_id, result)) = append_rx.recv() => {
                    self.sync.complete_flush(&record_id, result);
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if matches!(command, Command::Flush { .. }) {
                            self.resubscribe().await;
                        }
                        self.handle(command, &append_tx);
                    }
                    None => break,
                },
            }
        }

        // Unsubscribe before the replica goes away.
        self.subscription = None;
        debug!("Sync task stopped");
    }

    fn handle(&mut self, command: Command, append_tx: &mpsc::UnboundedSender<AppendResult>) {
        match command {
            Command::Edit(apply) => {
                if let Some(delta) = apply(&mut self.replica) {
                    self.sync.record_local_edit(&delta);
                    self.publish();
                }
            }
            Command::Select { range, reply } => {
                self.replica.set_selection(range);
                let _ = reply.send(());
            }
            Command::State { reply } => {
                let _ = reply.send(DocumentState {
                    contents: self.replica.get_contents().clone(),
                    selection: self.replica.get_selection(),
                    watermark: self.sync.watermark(),
                    flush_state: self.sync.flush_state(),
                    settled: self.sync.buffer().is_empty(),
                    degraded: self.sync.is_degraded(),
                    protocol_error: self.sync.protocol_error().map(str::to_string),
                });
            }
            Command::Flush { reply } => {
                let _ = reply.send(self.start_flush(append_tx));
            }
        }
    }

    fn start_flush(&mut self, append_tx: &mpsc::UnboundedSender<AppendResult>) -> Option<RecordId> {
        let record = self.sync.begin_flush()?;
        let record_id = record.id.clone();
        let log = self.log.clone();
        let tx = append_tx.clone();

        tokio::spawn(
            async move {
                let id = record.id.clone();
                let result = log.append(record).await;
                let _ = tx.send((id, result));
            }
            .in_current_span(),
        );
        Some(record_id)
    }

    /// Reopen the log subscription from the watermark after it ended.
    async fn resubscribe(&mut self) {
        if self.subscription.is_some() || self.sync.protocol_error().is_some() {
            return;
        }
        let since = self.sync.watermark();
        match self.log.subscribe(since).await {
            Ok(subscription) => {
                info!(since = %since, "Resubscribed to delta log");
                self.sync.record_store_success();
                self.subscription = Some(subscription);
            }
            Err(err) => self.sync.record_store_failure(&err),
        }
    }

    async fn pull(&mut self, records: &[DeltaRecord]) {
        // Protocol errors are logged and broadcast by the manager.
        match self
            .sync
            .ingest_from(self.log.as_ref(), records, &mut self.replica)
            .await
        {
            Ok(outcome) => {
                if outcome.changed_replica() {
                    self.publish();
                }
            }
            Err(_) if self.sync.protocol_error().is_some() => {
                warn!("Stopping pull after protocol error");
                self.subscription = None;
            }
            // The history rebuild could not read the log; the next
            // subscription replays everything after the watermark.
            Err(_) => self.subscription = None,
        }
    }

    fn publish(&self) {
        self.contents.send_replace(self.replica.get_contents().clone());
    }
}

struct ReconcileTask {
    reconciler: HighlightReconciler<dyn HighlightStore>,
    feed: Option<HighlightStream>,
    contents: watch::Receiver<Delta>,
    events: broadcast::Sender<SyncEvent>,
    config: SyncConfig,
}

impl ReconcileTask {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<oneshot::Sender<ReconcileOutcome>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tick = interval(Duration::from_millis(
            self.config.reconcile_interval_ms.max(1),
        ));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick(), if self.config.auto_sync => {
                    self.pass().await;
                }
                snapshot = next_highlights(&mut self.feed) => match snapshot {
                    Some(highlights) => self.reconciler.load(highlights),
                    None => {
                        warn!("Highlight store subscription closed");
                        self.feed = None;
                    }
                },
                request = requests.recv() => match request {
                    Some(reply) => {
                        let outcome = self.pass().await;
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },
            }
        }

        self.feed = None;
        debug!("Reconcile task stopped");
    }

    async fn pass(&mut self) -> ReconcileOutcome {
        let contents = self.contents.borrow().clone();
        let outcome = self.reconciler.reconcile(&contents).await;
        if outcome.writes() > 0 {
            let _ = self.events.send(SyncEvent::HighlightsReconciled {
                created: outcome.created,
                updated: outcome.updated,
                deleted: outcome.deleted,
            });
        }
        outcome
    }
}
