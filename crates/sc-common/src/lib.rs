//! Sensor Clean common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the engine crates:
//! - Device and run identity types
//! - Measurement, outlier, clean and statistic records
//! - Common error types
//! - Output format specifications

pub mod error;
pub mod id;
pub mod measurement;
pub mod output;
pub mod schema;
pub mod summary;

pub use error::{Error, Result};
pub use id::{DeviceId, MeasurementKey, RunId};
pub use measurement::{
    CleanMeasurement, Field, FieldValues, IngestionCheckpoint, Measurement, OutlierRecord,
    ReferenceStatistic, WindowLabel,
};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
pub use summary::{DailyOutlierCount, DailyOutlierPivot, DailySummary, PeriodStats};
