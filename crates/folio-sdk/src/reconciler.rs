//! Keeps the highlight store in line with the highlight spans in a document.
//!
//! Every open session reconciles against its own replica, and replicas lag
//! each other. A highlight a peer just created may already be in the store
//! while its span has not reached this replica yet. Deleting it would only
//! have the author recreate it, so a pass deletes only highlights whose span
//! this replica has shown at some point.

use crate::store::HighlightStore;
use folio_db::{plan, scan_highlights, Highlight, HighlightFields, HighlightId};
use folio_delta::Delta;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Result of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Writes that failed; they are planned again on the next pass.
    pub failed: usize,
    /// Known highlights missing from the text that this replica never
    /// showed; left for a session that did.
    pub deferred: usize,
}

impl ReconcileOutcome {
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// The sole writer of highlight records for one document.
pub struct HighlightReconciler<S: HighlightStore + ?Sized> {
    document_id: String,
    store: Arc<S>,
    known: BTreeMap<HighlightId, Highlight>,
    /// Highlights whose span has appeared in this replica.
    shown: HashSet<HighlightId>,
}

impl<S: HighlightStore + ?Sized> HighlightReconciler<S> {
    pub fn new(document_id: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            document_id: document_id.into(),
            store,
            known: BTreeMap::new(),
            shown: HashSet::new(),
        }
    }

    /// Highlights believed to be in the store.
    pub fn known(&self) -> &BTreeMap<HighlightId, Highlight> {
        &self.known
    }

    /// Replace the known set with a store snapshot.
    pub fn load(&mut self, highlights: Vec<Highlight>) {
        self.known = highlights
            .into_iter()
            .filter(|highlight| highlight.document_id == self.document_id)
            .map(|highlight| (highlight.id.clone(), highlight))
            .collect();
    }

    /// Run one pass against `contents`, stamping changes with the current time.
    pub async fn reconcile(&mut self, contents: &Delta) -> ReconcileOutcome {
        let now = chrono::Utc::now().timestamp_millis();
        self.reconcile_at(contents, now).await
    }

    /// Run one pass with an explicit clock reading (milliseconds).
    pub async fn reconcile_at(&mut self, contents: &Delta, now: i64) -> ReconcileOutcome {
        let spans = scan_highlights(contents);
        self.shown
            .extend(spans.iter().map(|span| span.highlight_id.clone()));
        let plan = plan(&self.document_id, &self.known, &spans, now);
        let mut outcome = ReconcileOutcome::default();

        for id in plan.deleted {
            if !self.shown.contains(&id) {
                trace!(highlight_id = %id, "Span not seen here yet, keeping highlight");
                outcome.deferred += 1;
                continue;
            }
            match self.store.delete(&id).await {
                Ok(()) => {
                    self.known.remove(&id);
                    self.shown.remove(&id);
                    outcome.deleted += 1;
                }
                Err(err) => {
                    warn!(highlight_id = %id, error = %err, "Highlight delete failed");
                    outcome.failed += 1;
                }
            }
        }

        for (id, patch) in plan.updated {
            match self.store.set(&id, patch.clone(), true).await {
                Ok(()) => {
                    if let Some(highlight) = self.known.get_mut(&id) {
                        patch.apply_to(highlight);
                    }
                    outcome.updated += 1;
                }
                Err(err) => {
                    warn!(highlight_id = %id, error = %err, "Highlight update failed");
                    outcome.failed += 1;
                }
            }
        }

        for highlight in plan.created {
            let fields = HighlightFields::from(highlight.clone());
            match self.store.set(&highlight.id, fields, false).await {
                Ok(()) => {
                    self.known.insert(highlight.id.clone(), highlight);
                    outcome.created += 1;
                }
                Err(err) => {
                    warn!(highlight_id = %highlight.id, error = %err, "Highlight create failed");
                    outcome.failed += 1;
                }
            }
        }

        if outcome.writes() > 0 || outcome.failed > 0 {
            debug!(
                document_id = %self.document_id,
                created = outcome.created,
                updated = outcome.updated,
                deleted = outcome.deleted,
                failed = outcome.failed,
                "Reconciled highlights"
            );
        }
        outcome
    }
}
