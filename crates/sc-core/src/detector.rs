//! Outlier detector.
//!
//! Bounds are `mean ± OUTLIER_SIGMA · stddev` of the measured output, taken
//! from the clean dataset when it has rows and from the raw dataset
//! otherwise. The population includes the values being judged, so a single
//! extreme reading widens its own bounds; that is expected behavior.
//!
//! # Scope
//!
//! ```text
//! outlier store empty  ──► scan every raw row
//! outlier store filled ──► scan raw rows with ts > max(clean.ts)
//! ```
//!
//! Rows already in the clean dataset are never flagged; clean rows are
//! immutable and the two sets stay disjoint.

use crate::stage::{SkipReason, StageOutcome, StageResult};
use crate::store::Store;
use chrono::{NaiveDateTime, Utc};
use sc_common::{Measurement, MeasurementKey, OutlierRecord};
use sc_config::OUTLIER_SIGMA;
use sc_math::Moments;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Inclusion band around the reference mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub mean: f64,
    pub stddev: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn new(mean: f64, stddev: f64) -> Self {
        let half_width = OUTLIER_SIGMA * stddev;
        Self {
            mean,
            stddev,
            lower: mean - half_width,
            upper: mean + half_width,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Dataset the bounds were computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePopulation {
    Clean,
    Raw,
}

/// Which raw rows a run classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanScope {
    Full,
    After { high_water_mark: NaiveDateTime },
}

impl ScanScope {
    fn includes(&self, ts: NaiveDateTime) -> bool {
        match self {
            ScanScope::Full => true,
            ScanScope::After { high_water_mark } => ts > *high_water_mark,
        }
    }
}

/// Outcome of a detection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub population: ReferencePopulation,
    pub population_size: u64,
    pub bounds: Bounds,
    pub scope: ScanScope,
    pub scanned: usize,
    pub flagged: usize,
}

/// Result of evaluating a reference population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundsDecision {
    Ready(Bounds),
    Undefined,
    Degenerate { mean: f64, stddev: f64 },
}

/// Derive bounds from a population of output values.
pub fn evaluate_population(values: &[f64]) -> (BoundsDecision, u64) {
    let moments = Moments::from_slice(values);
    let decision = match (moments.mean(), moments.population_stddev()) {
        (Some(mean), Some(stddev)) if stddev == 0.0 => BoundsDecision::Degenerate { mean, stddev },
        (Some(mean), Some(stddev)) => BoundsDecision::Ready(Bounds::new(mean, stddev)),
        _ => BoundsDecision::Undefined,
    };
    (decision, moments.count())
}

/// Raw rows in scope whose output lies outside the bounds.
///
/// Rows without an output value are never flagged.
pub fn classify<'a>(
    raw: &'a [Measurement],
    bounds: &Bounds,
    scope: ScanScope,
    clean_keys: &BTreeSet<MeasurementKey>,
) -> (usize, Vec<&'a Measurement>) {
    let mut scanned = 0;
    let mut flagged = Vec::new();
    for m in raw.iter().filter(|m| scope.includes(m.timestamp)) {
        scanned += 1;
        let Some(value) = m.output() else {
            continue;
        };
        if !bounds.contains(value) && !clean_keys.contains(&m.key()) {
            flagged.push(m);
        }
    }
    (scanned, flagged)
}

/// Run one detection pass and upsert the flagged rows.
pub fn detect_outliers<S: Store + ?Sized>(store: &mut S) -> StageResult<DetectionSummary> {
    let raw = store.raw_measurements()?;
    if raw.is_empty() {
        info!("no raw data; detection skipped");
        return Ok(StageOutcome::Skipped(SkipReason::NoRawData));
    }
    let clean = store.clean_measurements()?;

    let (population, values): (ReferencePopulation, Vec<f64>) = if clean.is_empty() {
        (
            ReferencePopulation::Raw,
            raw.iter().filter_map(|m| m.output()).collect(),
        )
    } else {
        (
            ReferencePopulation::Clean,
            clean.iter().map(|c| c.power_output).collect(),
        )
    };

    let (decision, population_size) = evaluate_population(&values);
    let bounds = match decision {
        BoundsDecision::Ready(bounds) => bounds,
        BoundsDecision::Undefined => {
            info!(population = ?population, "reference population has no output values");
            return Ok(StageOutcome::Skipped(SkipReason::NoReferenceData));
        }
        BoundsDecision::Degenerate { mean, stddev } => {
            info!(population = ?population, mean, "reference population has zero spread");
            return Ok(StageOutcome::Skipped(SkipReason::DegenerateSpread { mean, stddev }));
        }
    };

    let has_outliers = !store.outliers()?.is_empty();
    let high_water_mark = clean.iter().map(|c| c.timestamp).max();
    let scope = match (has_outliers, high_water_mark) {
        (true, Some(high_water_mark)) => ScanScope::After { high_water_mark },
        _ => ScanScope::Full,
    };

    let clean_keys: BTreeSet<MeasurementKey> = clean.iter().map(|c| c.key()).collect();
    let (scanned, flagged) = classify(&raw, &bounds, scope, &clean_keys);
    debug!(
        lower = bounds.lower,
        upper = bounds.upper,
        scanned,
        flagged = flagged.len(),
        "classification done"
    );

    let detected_at = Utc::now();
    let records: Vec<OutlierRecord> = flagged
        .into_iter()
        .map(|m| OutlierRecord::new(m.clone(), detected_at))
        .collect();
    if !records.is_empty() {
        store.upsert_outliers(&records)?;
    }

    info!(
        population = ?population,
        mean = bounds.mean,
        stddev = bounds.stddev,
        scanned,
        flagged = records.len(),
        "outlier detection complete"
    );

    Ok(StageOutcome::Completed(DetectionSummary {
        population,
        population_size,
        bounds,
        scope,
        scanned,
        flagged: records.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use sc_common::{CleanMeasurement, DeviceId, FieldValues};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn reading(device: i64, hour: u32, output: Option<f64>) -> Measurement {
        Measurement::new(
            DeviceId(device),
            at(hour),
            FieldValues::new(Some(10.0), Some(180.0), output),
        )
    }

    #[test]
    fn bounds_are_symmetric() {
        let b = Bounds::new(180.2, 159.9);
        assert!(((b.upper - b.mean) - (b.mean - b.lower)).abs() < 1e-9);
        assert!(((b.upper - b.mean) - 2.0 * 159.9).abs() < 1e-9);
        assert!(b.contains(b.upper));
        assert!(b.contains(b.lower));
    }

    #[test]
    fn single_extreme_value_widens_its_own_bounds() {
        let values = [100.0, 102.0, 98.0, 101.0, 500.0];
        let (decision, n) = evaluate_population(&values);
        assert_eq!(n, 5);
        let BoundsDecision::Ready(bounds) = decision else {
            panic!("expected bounds, got {decision:?}");
        };
        assert!((bounds.mean - 180.2).abs() < 1e-9);
        assert!((bounds.stddev - 159.9054).abs() < 1e-3);
        assert!(bounds.contains(500.0));
        assert!((bounds.upper - 500.01).abs() < 0.01);
    }

    #[test]
    fn zero_spread_is_degenerate() {
        let (decision, _) = evaluate_population(&[7.0, 7.0, 7.0]);
        assert_eq!(decision, BoundsDecision::Degenerate { mean: 7.0, stddev: 0.0 });
        assert_eq!(evaluate_population(&[]).0, BoundsDecision::Undefined);
    }

    #[test]
    fn degenerate_population_skips_without_writes() {
        let mut store = MemoryStore::new();
        let raw: Vec<_> = (0..4).map(|h| reading(1, h, Some(42.0))).collect();
        store.upsert_raw(&raw).unwrap();
        let outcome = detect_outliers(&mut store).unwrap();
        assert!(matches!(
            outcome,
            StageOutcome::Skipped(SkipReason::DegenerateSpread { stddev, .. }) if stddev == 0.0
        ));
        assert!(store.outliers().unwrap().is_empty());
    }

    #[test]
    fn first_run_scans_raw_population() {
        let mut store = MemoryStore::new();
        let mut raw: Vec<_> = (0..10).map(|h| reading(1, h, Some(100.0 + h as f64))).collect();
        raw.push(reading(2, 11, Some(5000.0)));
        raw.push(reading(3, 12, None));
        store.upsert_raw(&raw).unwrap();

        let summary = detect_outliers(&mut store).unwrap().completed().unwrap();
        assert_eq!(summary.population, ReferencePopulation::Raw);
        assert_eq!(summary.scope, ScanScope::Full);
        assert_eq!(summary.scanned, 12);
        assert_eq!(summary.flagged, 1);
        let outliers = store.outliers().unwrap();
        assert_eq!(outliers[0].measurement.device_id, DeviceId(2));
    }

    #[test]
    fn later_runs_use_clean_population_and_high_water_mark() {
        let mut store = MemoryStore::new();
        let clean: Vec<_> = (0..6)
            .map(|h| {
                CleanMeasurement::from_complete(&reading(1, h, Some(100.0 + h as f64))).unwrap()
            })
            .collect();
        store.insert_clean_ignoring_existing(&clean).unwrap();
        let old_outlier = reading(9, 2, Some(9000.0));
        store
            .upsert_outliers(&[OutlierRecord::new(old_outlier.clone(), Utc::now())])
            .unwrap();

        let mut raw: Vec<_> = (0..6).map(|h| reading(1, h, Some(100.0 + h as f64))).collect();
        raw.push(old_outlier);
        // Older than the high-water mark: not rescanned even though extreme.
        raw.push(reading(4, 3, Some(-7000.0)));
        raw.push(reading(5, 8, Some(104.0)));
        raw.push(reading(6, 9, Some(700.0)));
        store.upsert_raw(&raw).unwrap();

        let summary = detect_outliers(&mut store).unwrap().completed().unwrap();
        assert_eq!(summary.population, ReferencePopulation::Clean);
        assert_eq!(summary.scope, ScanScope::After { high_water_mark: at(5) });
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.flagged, 1);
        let devices: Vec<_> = store
            .outliers()
            .unwrap()
            .iter()
            .map(|o| o.measurement.device_id)
            .collect();
        assert_eq!(devices, vec![DeviceId(6), DeviceId(9)]);
    }

    #[test]
    fn clean_rows_are_never_flagged() {
        let raw: Vec<_> = vec![reading(1, 0, Some(1.0)), reading(1, 1, Some(1000.0))];
        let clean_keys: BTreeSet<_> = [raw[1].key()].into_iter().collect();
        let bounds = Bounds::new(0.0, 1.0);
        let (scanned, flagged) = classify(&raw, &bounds, ScanScope::Full, &clean_keys);
        assert_eq!(scanned, 2);
        assert!(flagged.is_empty());
    }
}
