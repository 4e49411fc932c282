//! Dynamic aggregator.
//!
//! Two independent summaries:
//! - period stats: min/max/avg of the output per `(day, device)` over clean
//!   rows, upserted so a recomputation overwrites the previous values;
//! - daily outlier pivot: outlier counts per `(day, device)` whose column set
//!   is whatever devices the outlier store holds right now. It is stored in
//!   normalized `(day, device_id, count)` form and rebuilt from scratch on
//!   every run, since new devices add columns.

use crate::stage::{SkipReason, StageError, StageOutcome, StageResult};
use crate::store::{Store, StoreResult};
use chrono::NaiveDate;
use sc_common::{CleanMeasurement, DailyOutlierPivot, DeviceId, OutlierRecord, PeriodStats};
use sc_math::Extent;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Outcome of a period stats refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStatsSummary {
    pub groups: usize,
    pub upserted: usize,
}

/// Outcome of a pivot rebuild.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotSummary {
    pub devices: Vec<DeviceId>,
    pub days: usize,
    pub rows_written: usize,
    pub total_outliers: u64,
}

/// Group clean rows by `(day, device)` and summarize the output.
pub fn compute_period_stats(clean: &[CleanMeasurement]) -> Vec<PeriodStats> {
    let mut groups: BTreeMap<(NaiveDate, DeviceId), Vec<f64>> = BTreeMap::new();
    for row in clean {
        groups
            .entry((row.timestamp.date(), row.device_id))
            .or_default()
            .push(row.power_output);
    }
    groups
        .into_iter()
        .filter_map(|((day, device_id), values)| {
            let extent = Extent::of(&values)?;
            Some(PeriodStats {
                day,
                device_id,
                min_output: extent.min,
                max_output: extent.max,
                avg_output: extent.mean,
            })
        })
        .collect()
}

pub fn refresh_period_stats<S: Store + ?Sized>(store: &mut S) -> StageResult<PeriodStatsSummary> {
    let clean = store.clean_measurements()?;
    if clean.is_empty() {
        info!("no clean data; period stats skipped");
        return Ok(StageOutcome::Skipped(SkipReason::NoCleanData));
    }
    let rows = compute_period_stats(&clean);
    let upserted = store.upsert_period_stats(&rows)?;
    info!(groups = rows.len(), "period stats upserted");
    Ok(StageOutcome::Completed(PeriodStatsSummary {
        groups: rows.len(),
        upserted,
    }))
}

/// Build the pivot from the outlier store's current contents.
///
/// Fails when there is no device to make a column from.
pub fn build_outlier_pivot(outliers: &[OutlierRecord]) -> Result<DailyOutlierPivot, StageError> {
    let mut pivot =
        DailyOutlierPivot::with_devices(outliers.iter().map(|o| o.measurement.device_id));
    if pivot.devices.is_empty() {
        return Err(StageError::NoDevices);
    }
    for o in outliers {
        pivot.add(o.measurement.timestamp.date(), o.measurement.device_id, 1);
    }
    Ok(pivot)
}

/// Drop and rebuild the stored daily outlier counts.
pub fn rebuild_outlier_pivot<S: Store + ?Sized>(store: &mut S) -> StageResult<PivotSummary> {
    let outliers = store.outliers()?;
    let pivot = build_outlier_pivot(&outliers)?;
    let counts = pivot.to_counts();
    store.replace_daily_outlier_counts(&counts)?;

    let summary = PivotSummary {
        devices: pivot.devices.iter().copied().collect(),
        days: pivot.rows.len(),
        rows_written: counts.len(),
        total_outliers: counts.iter().map(|c| c.count).sum(),
    };
    info!(
        devices = summary.devices.len(),
        days = summary.days,
        outliers = summary.total_outliers,
        "daily outlier pivot rebuilt"
    );
    Ok(StageOutcome::Completed(summary))
}

/// Materialize the stored pivot.
pub fn load_pivot<S: Store + ?Sized>(store: &S) -> StoreResult<DailyOutlierPivot> {
    Ok(DailyOutlierPivot::from_counts(&store.daily_outlier_counts()?))
}
