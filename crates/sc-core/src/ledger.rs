//! Ingestion ledger.
//!
//! Tracks, per source name, how far an append-only source has been applied.
//! Advancing appends a new checkpoint; existing entries are never rewritten,
//! so the full history stays auditable.

use crate::store::{Store, StoreResult};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sc_common::IngestionCheckpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Logical position inside a source: last applied row's timestamp and the
/// count of data rows consumed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPosition {
    pub last_timestamp: NaiveDateTime,
    pub last_offset: u64,
}

impl From<&IngestionCheckpoint> for LedgerPosition {
    fn from(c: &IngestionCheckpoint) -> Self {
        Self {
            last_timestamp: c.last_timestamp,
            last_offset: c.last_offset,
        }
    }
}

/// Current position for a source, or `None` when it was never applied.
pub fn get_checkpoint<S: Store + ?Sized>(
    store: &S,
    source_name: &str,
) -> StoreResult<Option<LedgerPosition>> {
    Ok(store
        .latest_checkpoint(source_name)?
        .as_ref()
        .map(LedgerPosition::from))
}

/// Record a new position for a source.
///
/// `recorded_at` is kept strictly after the previous entry's so the new
/// checkpoint governs even if the wall clock stepped backwards.
pub fn advance<S: Store + ?Sized>(
    store: &mut S,
    source_name: &str,
    position: LedgerPosition,
) -> StoreResult<IngestionCheckpoint> {
    let previous = store.latest_checkpoint(source_name)?;
    let recorded_at = next_recorded_at(Utc::now(), previous.map(|p| p.recorded_at));
    let checkpoint = IngestionCheckpoint {
        source_name: source_name.to_string(),
        last_timestamp: position.last_timestamp,
        last_offset: position.last_offset,
        recorded_at,
    };
    store.append_checkpoint(&checkpoint)?;
    debug!(
        source = source_name,
        offset = position.last_offset,
        timestamp = %position.last_timestamp,
        "ledger advanced"
    );
    Ok(checkpoint)
}

/// Governing checkpoint of every source, ordered by source name.
pub fn latest_positions<S: Store + ?Sized>(store: &S) -> StoreResult<Vec<IngestionCheckpoint>> {
    let mut latest: BTreeMap<String, IngestionCheckpoint> = BTreeMap::new();
    for entry in store.ledger_entries()? {
        match latest.get(&entry.source_name) {
            Some(current) if current.recorded_at > entry.recorded_at => {}
            _ => {
                latest.insert(entry.source_name.clone(), entry);
            }
        }
    }
    Ok(latest.into_values().collect())
}

fn next_recorded_at(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn unknown_source_has_no_checkpoint() {
        let store = MemoryStore::new();
        assert_eq!(get_checkpoint(&store, "data_group_1.csv").unwrap(), None);
    }

    #[test]
    fn advance_appends_and_latest_governs() {
        let mut store = MemoryStore::new();
        let first = LedgerPosition {
            last_timestamp: ts(1),
            last_offset: 10,
        };
        let second = LedgerPosition {
            last_timestamp: ts(2),
            last_offset: 15,
        };
        advance(&mut store, "a.csv", first).unwrap();
        advance(&mut store, "a.csv", second).unwrap();
        assert_eq!(get_checkpoint(&store, "a.csv").unwrap(), Some(second));
        assert_eq!(store.checkpoints("a.csv").unwrap().len(), 2);
    }

    #[test]
    fn latest_positions_one_per_source() {
        let mut store = MemoryStore::new();
        let pos = |h, offset| LedgerPosition {
            last_timestamp: ts(h),
            last_offset: offset,
        };
        advance(&mut store, "b.csv", pos(1, 4)).unwrap();
        advance(&mut store, "a.csv", pos(2, 7)).unwrap();
        advance(&mut store, "b.csv", pos(3, 9)).unwrap();
        let latest = latest_positions(&store).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].source_name, "a.csv");
        assert_eq!(latest[1].last_offset, 9);
    }

    #[test]
    fn recorded_at_never_goes_backwards() {
        let prev = Utc::now();
        let earlier = prev - Duration::seconds(30);
        assert!(next_recorded_at(earlier, Some(prev)) > prev);
        assert!(next_recorded_at(prev, Some(prev)) > prev);
        let later = prev + Duration::seconds(1);
        assert_eq!(next_recorded_at(later, Some(prev)), later);
        assert_eq!(next_recorded_at(later, None), later);
    }
}
