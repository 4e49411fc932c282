//! Aggregate summary records.

use crate::id::DeviceId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-device, per-day min/max/average of the measured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub day: NaiveDate,
    pub device_id: DeviceId,
    pub min_output: f64,
    pub max_output: f64,
    pub avg_output: f64,
}

/// Normalized storage row of the daily outlier pivot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyOutlierCount {
    pub day: NaiveDate,
    pub device_id: DeviceId,
    pub count: u64,
}

/// One pivot row: the outlier count of every observed device on a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub day: NaiveDate,
    pub per_device_outlier_count: BTreeMap<DeviceId, u64>,
}

/// Device-keyed pivot of daily outlier counts.
///
/// The column set is whatever devices were observed when the pivot was built;
/// a cell that was never populated reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyOutlierPivot {
    pub devices: BTreeSet<DeviceId>,
    pub rows: BTreeMap<NaiveDate, BTreeMap<DeviceId, u64>>,
}

impl DailyOutlierPivot {
    /// Create an empty pivot with a fixed column set.
    pub fn with_devices(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        Self {
            devices: devices.into_iter().collect(),
            rows: BTreeMap::new(),
        }
    }

    /// Rebuild a pivot from its normalized rows.
    pub fn from_counts(counts: &[DailyOutlierCount]) -> Self {
        let mut pivot = Self::with_devices(counts.iter().map(|c| c.device_id));
        for c in counts {
            pivot.add(c.day, c.device_id, c.count);
        }
        pivot
    }

    /// Add to a cell. Unknown devices extend the column set.
    pub fn add(&mut self, day: NaiveDate, device_id: DeviceId, count: u64) {
        self.devices.insert(device_id);
        *self
            .rows
            .entry(day)
            .or_default()
            .entry(device_id)
            .or_insert(0) += count;
    }

    pub fn cell(&self, day: NaiveDate, device_id: DeviceId) -> u64 {
        self.rows
            .get(&day)
            .and_then(|r| r.get(&device_id))
            .copied()
            .unwrap_or(0)
    }

    /// Full rows with a zero for every device that had no outliers that day.
    pub fn summaries(&self) -> Vec<DailySummary> {
        self.rows
            .keys()
            .map(|day| DailySummary {
                day: *day,
                per_device_outlier_count: self
                    .devices
                    .iter()
                    .map(|d| (*d, self.cell(*day, *d)))
                    .collect(),
            })
            .collect()
    }

    /// Normalized rows, skipping zero cells.
    pub fn to_counts(&self) -> Vec<DailyOutlierCount> {
        self.rows
            .iter()
            .flat_map(|(day, cells)| {
                cells
                    .iter()
                    .filter(|(_, c)| **c > 0)
                    .map(move |(device_id, count)| DailyOutlierCount {
                        day: *day,
                        device_id: *device_id,
                        count: *count,
                    })
            })
            .collect()
    }

    /// Column headers in display order.
    pub fn column_names(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|d| format!("device_{}", d))
            .collect()
    }
}
