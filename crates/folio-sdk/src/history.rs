//! Recently applied records, kept to rebase concurrently cut records.
//!
//! A record cut at base timestamp `b` and committed at `t` did not see the
//! records committed in `(b, t)`. Every replica transforms it over those
//! records, in timestamp order and with the earlier record winning ties,
//! before applying it. All replicas hold the same applied forms, so all
//! replicas compute the same result.
//!
//! A replica that has pruned records a new record still needs does not
//! guess: it reports the gap, and the applied forms are rebuilt from the
//! log with [`History::replay`].

use folio_db::{DeltaRecord, RecordId, ServerTimestamp};
use folio_delta::{Delta, DeltaError};
use std::collections::{HashSet, VecDeque};

/// A committed record in the form it was applied to the confirmed document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedRecord {
    pub id: RecordId,
    pub timestamp: ServerTimestamp,
    pub delta: Delta,
}

/// The ops to apply for a record, after rebasing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rebased {
    pub delta: Delta,
    /// Some concurrent records had already been pruned, so `delta` is only
    /// partly rebased.
    pub truncated: bool,
}

#[derive(Clone, Debug)]
pub struct History {
    entries: VecDeque<AppliedRecord>,
    ids: HashSet<RecordId>,
    /// Every record committed after `floor` is in `entries`.
    floor: ServerTimestamp,
    limit: usize,
}

impl History {
    pub fn new(floor: ServerTimestamp, limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            ids: HashSet::new(),
            floor,
            limit,
        }
    }

    /// Replay the committed records in `(floor, upto]` onto `contents`, the
    /// document at `floor`.
    ///
    /// Returns the resulting document and the history of applied forms,
    /// unpruned until the next [`push`](Self::push) beyond `limit`.
    pub fn replay(
        contents: &Delta,
        floor: ServerTimestamp,
        records: &[DeltaRecord],
        upto: ServerTimestamp,
        limit: usize,
    ) -> Result<(Delta, History), DeltaError> {
        let mut committed: Vec<(ServerTimestamp, &DeltaRecord)> = records
            .iter()
            .filter_map(|record| record.timestamp.map(|ts| (ts, record)))
            .filter(|(ts, _)| *ts > floor && *ts <= upto)
            .collect();
        committed.sort_by_key(|(ts, _)| *ts);

        let mut contents = contents.clone();
        let mut history = History::new(floor, usize::MAX);
        for (timestamp, record) in committed {
            if history.contains(&record.id) {
                continue;
            }
            let delta = history.rebase(record, &[]).delta;
            contents = delta.apply_to(&contents)?;
            history.push(AppliedRecord {
                id: record.id.clone(),
                timestamp,
                delta,
            });
        }
        history.limit = limit;
        Ok((contents, history))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn floor(&self) -> ServerTimestamp {
        self.floor
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    pub fn push(&mut self, entry: AppliedRecord) {
        self.ids.insert(entry.id.clone());
        self.entries.push_back(entry);
        while self.entries.len() > self.limit {
            if let Some(pruned) = self.entries.pop_front() {
                self.ids.remove(&pruned.id);
                self.floor = pruned.timestamp;
            }
        }
    }

    /// Rebase `record` over the entries it did not see, followed by `staged`
    /// (entries applied in the current batch but not yet pushed).
    pub fn rebase(&self, record: &DeltaRecord, staged: &[AppliedRecord]) -> Rebased {
        let Some(base) = record.base_timestamp else {
            return Rebased {
                delta: record.ops.clone(),
                truncated: false,
            };
        };

        let delta = self
            .entries
            .iter()
            .chain(staged)
            .filter(|entry| entry.timestamp > base)
            .fold(record.ops.clone(), |ops, entry| entry.delta.transform(&ops, true));

        Rebased {
            delta,
            truncated: base < self.floor,
        }
    }
}
