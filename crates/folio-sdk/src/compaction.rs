//! Log compaction: fold committed records into a new snapshot.
//!
//! Replicas rebase a record over everything committed after its base
//! timestamp. A snapshot may therefore only cover a prefix that no retained
//! record still needs: if a record committed after the cut was based before
//! it, the cut is lowered to that base. [`safe_point`] finds the highest cut
//! with that property.

use crate::error::Result;
use crate::history::History;
use crate::store::RemoteDeltaLog;
use folio_db::{DeltaRecord, DocumentSnapshot, ServerTimestamp};
use tracing::{debug, info};

/// The highest timestamp `<= upto` that no later record is based below.
///
/// Uncommitted records count as later than any cut.
pub fn safe_point(records: &[DeltaRecord], upto: ServerTimestamp) -> ServerTimestamp {
    let mut safe = upto;
    loop {
        let lowest_base = records
            .iter()
            .filter(|record| record.timestamp.map_or(true, |ts| ts > safe))
            .filter_map(|record| record.base_timestamp)
            .min();

        match lowest_base {
            Some(base) if base < safe => safe = base,
            _ => return safe,
        }
    }
}

/// Fold the log's committed records up to `upto` into a new snapshot.
///
/// Returns the snapshot written, or `None` when nothing past the current
/// snapshot can be folded yet.
pub async fn compact<L>(log: &L, upto: ServerTimestamp) -> Result<Option<DocumentSnapshot>>
where
    L: RemoteDeltaLog + ?Sized,
{
    let snapshot = log.latest_snapshot().await?;
    let floor = snapshot.snapshot_timestamp;
    if upto <= floor {
        return Ok(None);
    }

    let records = log.records_since(floor).await?;

    let cut = safe_point(&records, upto);
    if cut <= floor {
        debug!(upto = %upto, floor = %floor, "Nothing to compact");
        return Ok(None);
    }

    let (contents, history) = History::replay(&snapshot.ops, floor, &records, cut, usize::MAX)?;
    let folded = history.len();

    let compacted = DocumentSnapshot::new(contents, cut);
    log.write_snapshot(compacted.clone()).await?;
    info!(records = folded, snapshot_timestamp = %cut, "Compacted delta log");
    Ok(Some(compacted))
}
