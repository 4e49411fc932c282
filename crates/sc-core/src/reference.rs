//! Reference statistics engine.
//!
//! For each lookback window ending at the newest raw timestamp, computes mean,
//! median and mode per field over raw measurements that are complete and not
//! classified as outliers. Every run appends a fresh set of rows; imputation
//! reads the newest row per `(window, field)`.

use crate::stage::{SkipReason, StageOutcome, StageResult};
use crate::store::Store;
use chrono::{DateTime, NaiveDateTime, Utc};
use sc_common::{Field, Measurement, MeasurementKey, ReferenceStatistic, WindowLabel};
use sc_math::CentralTendency;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Statistics computed for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStatistics {
    pub window: WindowLabel,
    pub start: Option<NaiveDateTime>,
    pub population: usize,
    pub statistics: Vec<ReferenceStatistic>,
}

/// Outcome of a statistics refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub reference_timestamp: NaiveDateTime,
    pub computed: Vec<WindowStatistics>,
    pub empty_windows: Vec<WindowLabel>,
    pub rows_appended: usize,
}

/// Compute every window's statistics. Empty windows are omitted.
pub fn compute_windows(
    raw: &[Measurement],
    outlier_keys: &BTreeSet<MeasurementKey>,
    reference: NaiveDateTime,
    computed_at: DateTime<Utc>,
) -> Vec<WindowStatistics> {
    let eligible: Vec<&Measurement> = raw
        .iter()
        .filter(|m| m.values.is_complete() && !outlier_keys.contains(&m.key()))
        .collect();

    let mut out = Vec::new();
    for window in WindowLabel::ALL {
        let start = window.start(reference);
        let population: Vec<&Measurement> = eligible
            .iter()
            .copied()
            .filter(|m| start.map_or(true, |s| m.timestamp >= s))
            .collect();
        if population.is_empty() {
            debug!(window = %window, "empty window, skipping");
            continue;
        }

        let statistics = Field::ALL
            .into_iter()
            .map(|field| {
                let values: Vec<f64> = population
                    .iter()
                    .filter_map(|m| m.values.get(field))
                    .collect();
                let ct = CentralTendency::of(&values);
                ReferenceStatistic {
                    window_label: window,
                    field,
                    mean: ct.mean,
                    median: ct.median,
                    mode: ct.mode,
                    computed_at,
                }
            })
            .collect();

        out.push(WindowStatistics {
            window,
            start,
            population: population.len(),
            statistics,
        });
    }
    out
}

/// Compute and append statistics for all windows.
pub fn refresh_statistics<S: Store + ?Sized>(store: &mut S) -> StageResult<StatisticsSummary> {
    let raw = store.raw_measurements()?;
    let Some(reference) = raw.iter().map(|m| m.timestamp).max() else {
        info!("no raw data; statistics not computed");
        return Ok(StageOutcome::Skipped(SkipReason::NoRawData));
    };
    let outlier_keys: BTreeSet<MeasurementKey> =
        store.outliers()?.iter().map(|o| o.key()).collect();

    let computed = compute_windows(&raw, &outlier_keys, reference, Utc::now());
    if computed.is_empty() {
        info!("every statistics window is empty");
        return Ok(StageOutcome::Skipped(SkipReason::NoPopulation));
    }

    let rows: Vec<ReferenceStatistic> = computed
        .iter()
        .flat_map(|w| w.statistics.iter().cloned())
        .collect();
    store.append_reference_statistics(&rows)?;

    let empty_windows: Vec<WindowLabel> = WindowLabel::ALL
        .into_iter()
        .filter(|w| !computed.iter().any(|c| c.window == *w))
        .collect();
    info!(
        reference = %reference,
        windows = computed.len(),
        rows = rows.len(),
        "reference statistics appended"
    );

    Ok(StageOutcome::Completed(StatisticsSummary {
        reference_timestamp: reference,
        computed,
        empty_windows,
        rows_appended: rows.len(),
    }))
}

/// Newest statistic per field for one window.
pub fn latest_for_window(
    stats: &[ReferenceStatistic],
    window: WindowLabel,
) -> BTreeMap<Field, ReferenceStatistic> {
    let mut latest: BTreeMap<Field, ReferenceStatistic> = BTreeMap::new();
    for s in stats.iter().filter(|s| s.window_label == window) {
        match latest.get(&s.field) {
            Some(current) if current.computed_at > s.computed_at => {}
            _ => {
                latest.insert(s.field, s.clone());
            }
        }
    }
    latest
}

/// Newest statistics for every window that has any.
pub fn latest_snapshot(
    stats: &[ReferenceStatistic],
) -> BTreeMap<WindowLabel, BTreeMap<Field, ReferenceStatistic>> {
    WindowLabel::ALL
        .into_iter()
        .map(|w| (w, latest_for_window(stats, w)))
        .filter(|(_, fields)| !fields.is_empty())
        .collect()
}
