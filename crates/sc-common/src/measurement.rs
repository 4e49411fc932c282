//! Measurement records and the entities derived from them.

use crate::id::{DeviceId, MeasurementKey};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named numeric field carried by every measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    WindSpeed,
    WindDirection,
    /// The measured output used for outlier detection and period statistics.
    PowerOutput,
}

impl Field {
    /// All fields in column order.
    pub const ALL: [Field; 3] = [Field::WindSpeed, Field::WindDirection, Field::PowerOutput];

    /// The measured output field.
    pub const OUTPUT: Field = Field::PowerOutput;

    /// Column name used in source files and stores.
    pub fn column(&self) -> &'static str {
        match self {
            Field::WindSpeed => "wind_speed",
            Field::WindDirection => "wind_direction",
            Field::PowerOutput => "power_output",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Field::ALL
            .into_iter()
            .find(|f| f.column().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Field values of a measurement. `None` marks an absent reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldValues {
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub power_output: Option<f64>,
}

impl FieldValues {
    pub fn new(
        wind_speed: Option<f64>,
        wind_direction: Option<f64>,
        power_output: Option<f64>,
    ) -> Self {
        Self {
            wind_speed,
            wind_direction,
            power_output,
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::WindSpeed => self.wind_speed,
            Field::WindDirection => self.wind_direction,
            Field::PowerOutput => self.power_output,
        }
    }

    pub fn set(&mut self, field: Field, value: Option<f64>) {
        match field {
            Field::WindSpeed => self.wind_speed = value,
            Field::WindDirection => self.wind_direction = value,
            Field::PowerOutput => self.power_output = value,
        }
    }

    /// True when every field carries a value.
    pub fn is_complete(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_some())
    }

    /// Fields that are absent, in column order.
    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }
}

/// A raw, timestamped, per-device reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub device_id: DeviceId,
    pub timestamp: NaiveDateTime,
    #[serde(flatten)]
    pub values: FieldValues,
}

impl Measurement {
    pub fn new(device_id: DeviceId, timestamp: NaiveDateTime, values: FieldValues) -> Self {
        Self {
            device_id,
            timestamp,
            values,
        }
    }

    pub fn key(&self) -> MeasurementKey {
        MeasurementKey::new(self.device_id, self.timestamp)
    }

    /// Value of the measured output field.
    pub fn output(&self) -> Option<f64> {
        self.values.get(Field::OUTPUT)
    }
}

/// A raw measurement classified as out of bounds.
///
/// This is a cache: it is re-derivable from raw data and the current bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierRecord {
    #[serde(flatten)]
    pub measurement: Measurement,
    pub detected_at: DateTime<Utc>,
}

impl OutlierRecord {
    pub fn new(measurement: Measurement, detected_at: DateTime<Utc>) -> Self {
        Self {
            measurement,
            detected_at,
        }
    }

    pub fn key(&self) -> MeasurementKey {
        self.measurement.key()
    }
}

/// A measurement with every field present (imputed where necessary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanMeasurement {
    pub device_id: DeviceId,
    pub timestamp: NaiveDateTime,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub power_output: f64,
}

impl CleanMeasurement {
    /// Build from a measurement whose fields are all present.
    pub fn from_complete(m: &Measurement) -> Option<Self> {
        Some(Self {
            device_id: m.device_id,
            timestamp: m.timestamp,
            wind_speed: m.values.wind_speed?,
            wind_direction: m.values.wind_direction?,
            power_output: m.values.power_output?,
        })
    }

    pub fn key(&self) -> MeasurementKey {
        MeasurementKey::new(self.device_id, self.timestamp)
    }

    pub fn get(&self, field: Field) -> f64 {
        match field {
            Field::WindSpeed => self.wind_speed,
            Field::WindDirection => self.wind_direction,
            Field::PowerOutput => self.power_output,
        }
    }
}

/// Durable record of how much of a source has been applied.
///
/// Checkpoints are superseded, never mutated: the most recent by
/// `recorded_at` governs future reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionCheckpoint {
    pub source_name: String,
    pub last_timestamp: NaiveDateTime,
    pub last_offset: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Named lookback period used for reference statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowLabel {
    #[serde(alias = "full_dataset")]
    Full,
    #[serde(rename = "last_4w", alias = "last_4_weeks")]
    Last4w,
    #[serde(rename = "last_2w", alias = "last_2_weeks")]
    Last2w,
    #[serde(rename = "last_1w", alias = "last_1_week")]
    Last1w,
    #[serde(rename = "last_1d", alias = "last_1_day")]
    Last1d,
}

impl WindowLabel {
    pub const ALL: [WindowLabel; 5] = [
        WindowLabel::Full,
        WindowLabel::Last4w,
        WindowLabel::Last2w,
        WindowLabel::Last1w,
        WindowLabel::Last1d,
    ];

    /// Lookback from the reference timestamp; `None` for full history.
    pub fn lookback(&self) -> Option<chrono::Duration> {
        match self {
            WindowLabel::Full => None,
            WindowLabel::Last4w => Some(chrono::Duration::weeks(4)),
            WindowLabel::Last2w => Some(chrono::Duration::weeks(2)),
            WindowLabel::Last1w => Some(chrono::Duration::weeks(1)),
            WindowLabel::Last1d => Some(chrono::Duration::days(1)),
        }
    }

    /// Inclusive window start for a reference timestamp.
    pub fn start(&self, reference: NaiveDateTime) -> Option<NaiveDateTime> {
        self.lookback().map(|d| reference - d)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowLabel::Full => "full",
            WindowLabel::Last4w => "last_4w",
            WindowLabel::Last2w => "last_2w",
            WindowLabel::Last1w => "last_1w",
            WindowLabel::Last1d => "last_1d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full_dataset" => Some(WindowLabel::Full),
            "last_4w" | "last_4_weeks" => Some(WindowLabel::Last4w),
            "last_2w" | "last_2_weeks" => Some(WindowLabel::Last2w),
            "last_1w" | "last_1_week" => Some(WindowLabel::Last1w),
            "last_1d" | "last_1_day" => Some(WindowLabel::Last1d),
            _ => None,
        }
    }
}

impl fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Central-tendency statistics of one field over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStatistic {
    pub window_label: WindowLabel,
    pub field: Field,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub mode: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn field_values_missing_in_column_order() {
        let v = FieldValues::new(None, Some(180.0), None);
        assert_eq!(v.missing(), vec![Field::WindSpeed, Field::PowerOutput]);
        assert!(!v.is_complete());
    }

    #[test]
    fn field_from_column_is_case_insensitive() {
        assert_eq!(Field::from_column("Power_Output"), Some(Field::PowerOutput));
        assert_eq!(Field::from_column("rotor_rpm"), None);
    }

    #[test]
    fn clean_from_complete_requires_all_fields() {
        let m = Measurement::new(DeviceId(1), ts(), FieldValues::new(Some(1.0), None, Some(3.0)));
        assert!(CleanMeasurement::from_complete(&m).is_none());
        let m = Measurement::new(
            DeviceId(1),
            ts(),
            FieldValues::new(Some(1.0), Some(2.0), Some(3.0)),
        );
        let clean = CleanMeasurement::from_complete(&m).unwrap();
        assert_eq!(clean.get(Field::WindDirection), 2.0);
        assert_eq!(clean.key(), m.key());
    }

    #[test]
    fn window_start_subtracts_lookback() {
        assert_eq!(WindowLabel::Full.start(ts()), None);
        let start = WindowLabel::Last1d.start(ts()).unwrap();
        assert_eq!(ts() - start, chrono::Duration::days(1));
        let start = WindowLabel::Last4w.start(ts()).unwrap();
        assert_eq!(ts() - start, chrono::Duration::weeks(4));
    }

    #[test]
    fn window_label_parses_legacy_names() {
        assert_eq!(WindowLabel::parse("full_dataset"), Some(WindowLabel::Full));
        assert_eq!(WindowLabel::parse("last_2_weeks"), Some(WindowLabel::Last2w));
        assert_eq!(WindowLabel::parse("LAST_1D"), Some(WindowLabel::Last1d));
        assert_eq!(WindowLabel::parse("last_3_days"), None);
    }

    #[test]
    fn measurement_serializes_flat() {
        let m = Measurement::new(
            DeviceId(4),
            ts(),
            FieldValues::new(Some(10.5), None, Some(1500.0)),
        );
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["device_id"], 4);
        assert_eq!(json["power_output"], 1500.0);
        assert!(json["wind_direction"].is_null());
        let back: Measurement = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
