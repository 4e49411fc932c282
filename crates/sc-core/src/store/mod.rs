//! Persistent table store.
//!
//! The engine never talks to storage directly; every stage reads and writes
//! through the [`Store`] trait. Each write method is one unit of work: it
//! applies completely or leaves the store untouched.
//!
//! Uniqueness is on `(device_id, timestamp)` for raw, outlier and clean rows
//! and on `(day, device_id)` for period stats. The ledger and reference
//! statistics are append-only.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use chrono::NaiveDateTime;
use sc_common::{
    CleanMeasurement, DailyOutlierCount, IngestionCheckpoint, Measurement, OutlierRecord,
    PeriodStats, ReferenceStatistic,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from store operations. All of them are transient from the engine's
/// point of view: the failing stage aborts and nothing it wrote is kept.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt row in table {table} at line {line}: {source}")]
    Corrupt {
        table: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode row for table {table}: {source}")]
    Encode {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for sc_common::Error {
    fn from(e: StoreError) -> Self {
        sc_common::Error::TransientStore(e.to_string())
    }
}

/// Row counts per table, for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub raw: usize,
    pub ledger: usize,
    pub outliers: usize,
    pub reference_statistics: usize,
    pub clean: usize,
    pub period_stats: usize,
    pub daily_outlier_counts: usize,
}

/// Typed repository over the seven pipeline tables.
pub trait Store {
    // ── raw ────────────────────────────────────────────────────────────
    fn raw_measurements(&self) -> StoreResult<Vec<Measurement>>;

    /// Insert or refresh field values on key conflict. Returns rows written.
    fn upsert_raw(&mut self, records: &[Measurement]) -> StoreResult<usize>;

    // ── ledger ─────────────────────────────────────────────────────────
    /// Every checkpoint ever recorded, in insertion order.
    fn ledger_entries(&self) -> StoreResult<Vec<IngestionCheckpoint>>;

    fn append_checkpoint(&mut self, checkpoint: &IngestionCheckpoint) -> StoreResult<()>;

    // ── outliers ───────────────────────────────────────────────────────
    fn outliers(&self) -> StoreResult<Vec<OutlierRecord>>;

    /// Insert, or refresh values and `detected_at` on key conflict.
    fn upsert_outliers(&mut self, records: &[OutlierRecord]) -> StoreResult<usize>;

    // ── reference statistics ───────────────────────────────────────────
    fn reference_statistics(&self) -> StoreResult<Vec<ReferenceStatistic>>;

    fn append_reference_statistics(&mut self, stats: &[ReferenceStatistic]) -> StoreResult<()>;

    // ── clean ──────────────────────────────────────────────────────────
    fn clean_measurements(&self) -> StoreResult<Vec<CleanMeasurement>>;

    /// Insert rows whose key is not yet present. Existing rows are never
    /// touched. Returns the number actually inserted.
    fn insert_clean_ignoring_existing(&mut self, rows: &[CleanMeasurement]) -> StoreResult<usize>;

    // ── summaries ──────────────────────────────────────────────────────
    fn period_stats(&self) -> StoreResult<Vec<PeriodStats>>;

    /// Overwrite on `(day, device_id)` conflict.
    fn upsert_period_stats(&mut self, rows: &[PeriodStats]) -> StoreResult<usize>;

    fn daily_outlier_counts(&self) -> StoreResult<Vec<DailyOutlierCount>>;

    /// Drop the table and rebuild it from `rows`.
    fn replace_daily_outlier_counts(&mut self, rows: &[DailyOutlierCount]) -> StoreResult<()>;

    // ── derived helpers ────────────────────────────────────────────────
    fn checkpoints(&self, source_name: &str) -> StoreResult<Vec<IngestionCheckpoint>> {
        Ok(self
            .ledger_entries()?
            .into_iter()
            .filter(|c| c.source_name == source_name)
            .collect())
    }

    /// Most recent checkpoint by `recorded_at`; ties go to the later entry.
    fn latest_checkpoint(&self, source_name: &str) -> StoreResult<Option<IngestionCheckpoint>> {
        Ok(self
            .checkpoints(source_name)?
            .into_iter()
            .max_by_key(|c| c.recorded_at))
    }

    fn max_raw_timestamp(&self) -> StoreResult<Option<NaiveDateTime>> {
        Ok(self.raw_measurements()?.iter().map(|m| m.timestamp).max())
    }

    fn max_clean_timestamp(&self) -> StoreResult<Option<NaiveDateTime>> {
        Ok(self.clean_measurements()?.iter().map(|c| c.timestamp).max())
    }

    fn table_counts(&self) -> StoreResult<TableCounts> {
        Ok(TableCounts {
            raw: self.raw_measurements()?.len(),
            ledger: self.ledger_entries()?.len(),
            outliers: self.outliers()?.len(),
            reference_statistics: self.reference_statistics()?.len(),
            clean: self.clean_measurements()?.len(),
            period_stats: self.period_stats()?.len(),
            daily_outlier_counts: self.daily_outlier_counts()?.len(),
        })
    }
}
