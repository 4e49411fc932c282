//! Clean dataset builder.
//!
//! Every raw row that is not an outlier becomes one clean row. Absent fields
//! are filled from the newest reference statistics of the configured window,
//! using the fixed per-field policy (median for wind speed and direction,
//! mean for power output). Inserts ignore keys that already exist, so a
//! rebuild never duplicates or alters a clean row.

use crate::reference::latest_for_window;
use crate::stage::{SkipReason, StageOutcome, StageResult};
use crate::store::Store;
use sc_common::{
    CleanMeasurement, Field, Measurement, MeasurementKey, ReferenceStatistic, WindowLabel,
};
use sc_config::{imputation_statistic, ImputationStatistic};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Fill values chosen from one statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Imputer {
    values: BTreeMap<Field, f64>,
}

impl Imputer {
    /// Pick each field's fill value from its newest statistic.
    pub fn from_statistics(latest: &BTreeMap<Field, ReferenceStatistic>) -> Self {
        let values = Field::ALL
            .into_iter()
            .filter_map(|field| {
                let stat = latest.get(&field)?;
                let value = match imputation_statistic(field) {
                    ImputationStatistic::Mean => stat.mean,
                    ImputationStatistic::Median => stat.median,
                    ImputationStatistic::Mode => stat.mode,
                }?;
                Some((field, value))
            })
            .collect();
        Self { values }
    }

    pub fn value(&self, field: Field) -> Option<f64> {
        self.values.get(&field).copied()
    }

    /// Complete a measurement. Returns the fields that could not be filled
    /// when the snapshot lacks a value for them.
    pub fn fill(&self, m: &Measurement) -> Result<(CleanMeasurement, usize), Vec<Field>> {
        let mut values = m.values;
        let mut imputed = 0;
        let mut unfilled = Vec::new();
        for field in m.values.missing() {
            match self.value(field) {
                Some(v) => {
                    values.set(field, Some(v));
                    imputed += 1;
                }
                None => unfilled.push(field),
            }
        }
        if !unfilled.is_empty() {
            return Err(unfilled);
        }
        let completed = Measurement::new(m.device_id, m.timestamp, values);
        CleanMeasurement::from_complete(&completed)
            .map(|c| (c, imputed))
            .ok_or_else(|| completed.values.missing())
    }
}

/// Outcome of a clean build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanBuildSummary {
    pub window: Option<WindowLabel>,
    /// Non-outlier raw rows not yet in the clean dataset.
    pub candidates: usize,
    pub inserted: usize,
    /// Field values filled from statistics.
    pub imputed_fields: usize,
    /// Rows held back because a needed statistic was unavailable.
    pub deferred: usize,
}

/// Rows ready for insertion, plus the counters that describe them.
pub fn build_clean_rows(
    raw: &[Measurement],
    outlier_keys: &BTreeSet<MeasurementKey>,
    existing: &BTreeSet<MeasurementKey>,
    imputer: &Imputer,
) -> (Vec<CleanMeasurement>, CleanBuildSummary) {
    let mut summary = CleanBuildSummary::default();
    let mut rows = Vec::new();
    for m in raw {
        let key = m.key();
        if outlier_keys.contains(&key) || existing.contains(&key) {
            continue;
        }
        summary.candidates += 1;
        match imputer.fill(m) {
            Ok((row, imputed)) => {
                summary.imputed_fields += imputed;
                rows.push(row);
            }
            Err(unfilled) => {
                debug!(key = %key, fields = ?unfilled, "no statistic to impute from; deferring");
                summary.deferred += 1;
            }
        }
    }
    (rows, summary)
}

/// Build and insert clean rows for the configured imputation window.
pub fn build_clean_dataset<S: Store + ?Sized>(
    store: &mut S,
    window: WindowLabel,
) -> StageResult<CleanBuildSummary> {
    let raw = store.raw_measurements()?;
    if raw.is_empty() {
        info!("no raw data; clean build skipped");
        return Ok(StageOutcome::Skipped(SkipReason::NoRawData));
    }
    let outlier_keys: BTreeSet<MeasurementKey> =
        store.outliers()?.iter().map(|o| o.key()).collect();
    let existing: BTreeSet<MeasurementKey> = store
        .clean_measurements()?
        .iter()
        .map(|c| c.key())
        .collect();
    let stats = store.reference_statistics()?;
    let imputer = Imputer::from_statistics(&latest_for_window(&stats, window));

    let (rows, mut summary) = build_clean_rows(&raw, &outlier_keys, &existing, &imputer);
    summary.window = Some(window);
    summary.inserted = if rows.is_empty() {
        0
    } else {
        store.insert_clean_ignoring_existing(&rows)?
    };

    if summary.deferred > 0 {
        warn!(
            window = %window,
            deferred = summary.deferred,
            "rows deferred for lack of imputation statistics"
        );
    }
    info!(
        window = %window,
        candidates = summary.candidates,
        inserted = summary.inserted,
        imputed = summary.imputed_fields,
        "clean dataset updated"
    );
    Ok(StageOutcome::Completed(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime, Utc};
    use sc_common::{DeviceId, FieldValues, OutlierRecord};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn stat(window: WindowLabel, field: Field, mean: f64, median: f64) -> ReferenceStatistic {
        ReferenceStatistic {
            window_label: window,
            field,
            mean: Some(mean),
            median: Some(median),
            mode: Some(0.0),
            computed_at: Utc::now(),
        }
    }

    fn full_snapshot() -> Vec<ReferenceStatistic> {
        vec![
            stat(WindowLabel::Full, Field::WindSpeed, 11.0, 10.0),
            stat(WindowLabel::Full, Field::WindDirection, 200.0, 180.0),
            stat(WindowLabel::Full, Field::PowerOutput, 1500.0, 1400.0),
        ]
    }

    #[test]
    fn policy_picks_median_for_wind_and_mean_for_output() {
        let imputer =
            Imputer::from_statistics(&latest_for_window(&full_snapshot(), WindowLabel::Full));
        assert_eq!(imputer.value(Field::WindSpeed), Some(10.0));
        assert_eq!(imputer.value(Field::WindDirection), Some(180.0));
        assert_eq!(imputer.value(Field::PowerOutput), Some(1500.0));
    }

    #[test]
    fn fill_only_touches_absent_fields() {
        let imputer =
            Imputer::from_statistics(&latest_for_window(&full_snapshot(), WindowLabel::Full));
        let m = Measurement::new(DeviceId(1), at(0), FieldValues::new(Some(0.0), None, None));
        let (row, imputed) = imputer.fill(&m).unwrap();
        assert_eq!(imputed, 2);
        assert_eq!(row.wind_speed, 0.0);
        assert_eq!(row.wind_direction, 180.0);
        assert_eq!(row.power_output, 1500.0);
    }

    #[test]
    fn missing_statistic_defers_row() {
        let imputer = Imputer::default();
        let complete = Measurement::new(
            DeviceId(1),
            at(0),
            FieldValues::new(Some(1.0), Some(2.0), Some(3.0)),
        );
        let partial =
            Measurement::new(DeviceId(1), at(1), FieldValues::new(Some(1.0), None, Some(3.0)));
        let (rows, summary) = build_clean_rows(
            &[complete, partial],
            &BTreeSet::new(),
            &BTreeSet::new(),
            &imputer,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(summary.deferred, 1);
        assert_eq!(summary.candidates, 2);
    }

    #[test]
    fn outliers_never_reach_clean_and_rebuild_is_idempotent() {
        let mut store = MemoryStore::new();
        let normal = Measurement::new(
            DeviceId(1),
            at(0),
            FieldValues::new(None, Some(90.0), Some(1000.0)),
        );
        let outlier = Measurement::new(
            DeviceId(2),
            at(0),
            FieldValues::new(Some(1.0), Some(1.0), Some(99999.0)),
        );
        store.upsert_raw(&[normal.clone(), outlier.clone()]).unwrap();
        store
            .upsert_outliers(&[OutlierRecord::new(outlier.clone(), Utc::now())])
            .unwrap();
        store.append_reference_statistics(&full_snapshot()).unwrap();

        let first = build_clean_dataset(&mut store, WindowLabel::Full)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(first.imputed_fields, 1);
        let snapshot = store.clean_measurements().unwrap();

        let second = build_clean_dataset(&mut store, WindowLabel::Full)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.candidates, 0);
        assert_eq!(store.clean_measurements().unwrap(), snapshot);
        assert!(snapshot.iter().all(|c| c.key() != outlier.key()));
        assert_eq!(snapshot[0].wind_speed, 10.0);
    }

    #[test]
    fn uses_configured_window_only() {
        let mut store = MemoryStore::new();
        let m = Measurement::new(DeviceId(1), at(0), FieldValues::new(None, Some(1.0), Some(1.0)));
        store.upsert_raw(&[m]).unwrap();
        store.append_reference_statistics(&full_snapshot()).unwrap();
        let summary = build_clean_dataset(&mut store, WindowLabel::Last1d)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(summary.deferred, 1);
        assert_eq!(summary.inserted, 0);
    }

    #[test]
    fn empty_raw_is_skipped() {
        let mut store = MemoryStore::new();
        assert_eq!(
            build_clean_dataset(&mut store, WindowLabel::Full).unwrap(),
            StageOutcome::Skipped(SkipReason::NoRawData)
        );
    }
}
