//! The local edit buffer: edits made on this replica that the log has not
//! yet confirmed.
//!
//! At most one record is in flight. Edits made while it is outstanding
//! accumulate in `pending` and go out in the next record once the first has
//! come back through the subscription.

use folio_db::{DeltaRecord, RecordId};
use folio_delta::Delta;

/// Where the in-flight record is in its round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushState {
    /// Nothing in flight.
    Idle,
    /// An append is outstanding.
    Flushing,
    /// The log accepted the record; waiting to see it in the stream.
    AwaitingEcho,
    /// The last append failed; the same record goes out again next tick.
    Retrying,
}

/// The record sent to the log, plus its ops rebased over everything the
/// replica has consumed since.
#[derive(Clone, Debug)]
pub struct InFlight {
    pub record: DeltaRecord,
    pub delta: Delta,
    pub state: FlushState,
}

#[derive(Clone, Debug, Default)]
pub struct LocalEditBuffer {
    in_flight: Option<InFlight>,
    pending: Delta,
}

impl LocalEditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    pub fn state(&self) -> FlushState {
        self.in_flight
            .as_ref()
            .map_or(FlushState::Idle, |in_flight| in_flight.state)
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn pending(&self) -> &Delta {
        &self.pending
    }

    /// Every unconfirmed local edit as one delta over the confirmed document.
    pub fn combined(&self) -> Delta {
        match &self.in_flight {
            Some(in_flight) => in_flight.delta.compose(&self.pending),
            None => self.pending.clone(),
        }
    }

    /// Record a local edit made on top of the current replica content.
    pub fn push(&mut self, edit: &Delta) {
        self.pending = self.pending.compose(edit);
    }

    /// The record to append now, if any.
    ///
    /// Resends the in-flight record after a failure; otherwise cuts a new
    /// record from `pending` via `cut` when nothing is in flight.
    pub fn next_record<F>(&mut self, cut: F) -> Option<DeltaRecord>
    where
        F: FnOnce(Delta) -> DeltaRecord,
    {
        match &mut self.in_flight {
            Some(in_flight) if in_flight.state == FlushState::Retrying => {
                in_flight.state = FlushState::Flushing;
                Some(in_flight.record.clone())
            }
            Some(_) => None,
            None if self.pending.is_empty() => None,
            None => {
                let delta = std::mem::take(&mut self.pending);
                let record = cut(delta.clone());
                self.in_flight = Some(InFlight {
                    record: record.clone(),
                    delta,
                    state: FlushState::Flushing,
                });
                Some(record)
            }
        }
    }

    /// The log accepted `record_id`. Returns false if it is no longer in flight.
    pub fn acknowledge(&mut self, record_id: &RecordId) -> bool {
        match self.in_flight_mut(record_id) {
            Some(in_flight) => {
                in_flight.state = FlushState::AwaitingEcho;
                true
            }
            None => false,
        }
    }

    /// The append of `record_id` failed; keep it for a retry.
    pub fn fail(&mut self, record_id: &RecordId) -> bool {
        match self.in_flight_mut(record_id) {
            Some(in_flight) => {
                in_flight.state = FlushState::Retrying;
                true
            }
            None => false,
        }
    }

    /// `record_id` came back committed: stop tracking it and return its
    /// rebased ops.
    pub fn confirm(&mut self, record_id: &RecordId) -> Option<Delta> {
        if self.in_flight_mut(record_id).is_none() {
            return None;
        }
        self.in_flight.take().map(|in_flight| in_flight.delta)
    }

    /// Rebase the buffer over a committed remote change to the confirmed
    /// document. The remote change wins ties.
    pub fn rebase(&mut self, remote: &Delta) {
        let remote = match &mut self.in_flight {
            Some(in_flight) => {
                let past_in_flight = in_flight.delta.transform(remote, false);
                in_flight.delta = remote.transform(&in_flight.delta, true);
                past_in_flight
            }
            None => remote.clone(),
        };
        self.pending = remote.transform(&self.pending, true);
    }

    fn in_flight_mut(&mut self, record_id: &RecordId) -> Option<&mut InFlight> {
        self.in_flight
            .as_mut()
            .filter(|in_flight| in_flight.record.id == *record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_db::EditorId;

    fn cut(delta: Delta) -> DeltaRecord {
        DeltaRecord::new(EditorId::new("ed"), "alice", None, delta)
    }

    fn insert_at(index: usize, text: &str) -> Delta {
        let mut delta = Delta::new();
        delta.retain(index).insert(text);
        delta
    }

    #[test]
    fn test_empty_buffer_cuts_nothing() {
        let mut buffer = LocalEditBuffer::new();
        assert!(buffer.next_record(cut).is_none());
        assert_eq!(buffer.state(), FlushState::Idle);
    }

    #[test]
    fn test_single_outstanding_record() {
        let mut buffer = LocalEditBuffer::new();
        buffer.push(&insert_at(0, "a"));
        let record = buffer.next_record(cut).unwrap();
        assert_eq!(buffer.state(), FlushState::Flushing);

        buffer.push(&insert_at(1, "b"));
        assert!(buffer.next_record(cut).is_none());
        assert_eq!(buffer.combined(), insert_at(0, "ab"));

        assert!(buffer.acknowledge(&record.id));
        assert_eq!(buffer.state(), FlushState::AwaitingEcho);

        assert_eq!(buffer.confirm(&record.id), Some(insert_at(0, "a")));
        assert_eq!(buffer.pending(), &insert_at(1, "b"));
        assert!(buffer.next_record(cut).is_some());
    }

    #[test]
    fn test_failed_append_resends_same_record() {
        let mut buffer = LocalEditBuffer::new();
        buffer.push(&insert_at(0, "a"));
        let record = buffer.next_record(cut).unwrap();

        assert!(buffer.fail(&record.id));
        assert_eq!(buffer.state(), FlushState::Retrying);

        let resent = buffer.next_record(cut).unwrap();
        assert_eq!(resent.id, record.id);
        assert_eq!(resent.ops, record.ops);
    }

    #[test]
    fn test_unknown_record_ids_are_ignored() {
        let mut buffer = LocalEditBuffer::new();
        buffer.push(&insert_at(0, "a"));
        buffer.next_record(cut).unwrap();

        let other = RecordId::new("other");
        assert!(!buffer.acknowledge(&other));
        assert!(!buffer.fail(&other));
        assert!(buffer.confirm(&other).is_none());
        assert_eq!(buffer.state(), FlushState::Flushing);
    }

    #[test]
    fn test_rebase_moves_both_halves() {
        let mut buffer = LocalEditBuffer::new();
        buffer.push(&insert_at(5, " World"));
        buffer.next_record(cut).unwrap();
        buffer.push(&insert_at(11, "!"));

        let mut remote = Delta::new();
        remote.insert("Hi ");
        buffer.rebase(&remote);

        assert_eq!(buffer.in_flight().unwrap().delta, insert_at(8, " World"));
        assert_eq!(buffer.pending(), &insert_at(14, "!"));
    }
}
