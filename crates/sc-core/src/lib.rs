//! Sensor Clean core engine.
//!
//! Incremental cleaning of append-only sensor batches:
//! - ledger-driven ingestion of new CSV rows into the raw table
//! - statistical outlier detection on the measured output
//! - windowed reference statistics and imputation into the clean table
//! - per-day period stats and a device-keyed daily outlier pivot
//!
//! Persistence goes through the [`Store`] trait; [`FileStore`] keeps one
//! JSON-lines file per table and [`MemoryStore`] backs tests.

pub mod aggregate;
pub mod clean;
pub mod cli;
pub mod detector;
pub mod exit_codes;
pub mod ingest;
pub mod ledger;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod reference;
pub mod sources;
pub mod stage;
pub mod store;

pub use exit_codes::ExitCode;
pub use pipeline::{CycleReport, Pipeline, StageName, StageReport, StageStatus};
pub use stage::{SkipReason, StageError, StageOutcome};
pub use store::{FileStore, MemoryStore, Store, StoreError};
