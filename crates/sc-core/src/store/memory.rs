//! In-memory store.

use super::{Store, StoreResult};
use chrono::NaiveDate;
use sc_common::{
    CleanMeasurement, DailyOutlierCount, DeviceId, IngestionCheckpoint, Measurement,
    MeasurementKey, OutlierRecord, PeriodStats, ReferenceStatistic,
};
use std::collections::BTreeMap;

/// Table contents. `FileStore` keeps one of these as its loaded view.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub raw: BTreeMap<MeasurementKey, Measurement>,
    pub ledger: Vec<IngestionCheckpoint>,
    pub outliers: BTreeMap<MeasurementKey, OutlierRecord>,
    pub statistics: Vec<ReferenceStatistic>,
    pub clean: BTreeMap<MeasurementKey, CleanMeasurement>,
    pub period_stats: BTreeMap<(NaiveDate, DeviceId), PeriodStats>,
    pub daily_counts: Vec<DailyOutlierCount>,
}

impl Tables {
    pub fn upsert_raw(&mut self, records: &[Measurement]) -> usize {
        for m in records {
            self.raw.insert(m.key(), m.clone());
        }
        records.len()
    }

    pub fn upsert_outliers(&mut self, records: &[OutlierRecord]) -> usize {
        for o in records {
            self.outliers.insert(o.key(), o.clone());
        }
        records.len()
    }

    pub fn insert_clean(&mut self, rows: &[CleanMeasurement]) -> usize {
        let mut inserted = 0;
        for row in rows {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.clean.entry(row.key()) {
                slot.insert(row.clone());
                inserted += 1;
            }
        }
        inserted
    }

    pub fn upsert_period_stats(&mut self, rows: &[PeriodStats]) -> usize {
        for row in rows {
            self.period_stats
                .insert((row.day, row.device_id), row.clone());
        }
        rows.len()
    }
}

/// `BTreeMap`-backed store. Nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn raw_measurements(&self) -> StoreResult<Vec<Measurement>> {
        Ok(self.tables.raw.values().cloned().collect())
    }

    fn upsert_raw(&mut self, records: &[Measurement]) -> StoreResult<usize> {
        Ok(self.tables.upsert_raw(records))
    }

    fn ledger_entries(&self) -> StoreResult<Vec<IngestionCheckpoint>> {
        Ok(self.tables.ledger.clone())
    }

    fn append_checkpoint(&mut self, checkpoint: &IngestionCheckpoint) -> StoreResult<()> {
        self.tables.ledger.push(checkpoint.clone());
        Ok(())
    }

    fn outliers(&self) -> StoreResult<Vec<OutlierRecord>> {
        Ok(self.tables.outliers.values().cloned().collect())
    }

    fn upsert_outliers(&mut self, records: &[OutlierRecord]) -> StoreResult<usize> {
        Ok(self.tables.upsert_outliers(records))
    }

    fn reference_statistics(&self) -> StoreResult<Vec<ReferenceStatistic>> {
        Ok(self.tables.statistics.clone())
    }

    fn append_reference_statistics(&mut self, stats: &[ReferenceStatistic]) -> StoreResult<()> {
        self.tables.statistics.extend_from_slice(stats);
        Ok(())
    }

    fn clean_measurements(&self) -> StoreResult<Vec<CleanMeasurement>> {
        Ok(self.tables.clean.values().cloned().collect())
    }

    fn insert_clean_ignoring_existing(&mut self, rows: &[CleanMeasurement]) -> StoreResult<usize> {
        Ok(self.tables.insert_clean(rows))
    }

    fn period_stats(&self) -> StoreResult<Vec<PeriodStats>> {
        Ok(self.tables.period_stats.values().cloned().collect())
    }

    fn upsert_period_stats(&mut self, rows: &[PeriodStats]) -> StoreResult<usize> {
        Ok(self.tables.upsert_period_stats(rows))
    }

    fn daily_outlier_counts(&self) -> StoreResult<Vec<DailyOutlierCount>> {
        Ok(self.tables.daily_counts.clone())
    }

    fn replace_daily_outlier_counts(&mut self, rows: &[DailyOutlierCount]) -> StoreResult<()> {
        self.tables.daily_counts = rows.to_vec();
        Ok(())
    }
}
