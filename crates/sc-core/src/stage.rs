//! Stage outcomes.
//!
//! A stage either completes with a payload, skips for a documented benign
//! reason, or fails. Skips are not errors and never halt a cycle.

use crate::loader::LoadError;
use crate::store::StoreError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result of a stage that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Completed(T),
    Skipped(SkipReason),
}

impl<T> StageOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            StageOutcome::Completed(v) => Some(v),
            StageOutcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            StageOutcome::Skipped(r) => Some(r),
            StageOutcome::Completed(_) => None,
        }
    }
}

/// Why a stage had nothing to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The raw table is empty.
    NoRawData,
    /// Neither clean nor raw data yields a defined mean/stddev.
    NoReferenceData,
    /// The reference population has no spread.
    DegenerateSpread { mean: f64, stddev: f64 },
    /// Every statistics window was empty.
    NoPopulation,
    /// The clean table is empty.
    NoCleanData,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRawData => write!(f, "no raw data"),
            SkipReason::NoReferenceData => write!(f, "no reference data for bounds"),
            SkipReason::DegenerateSpread { mean, stddev } => {
                write!(f, "degenerate spread (mean={mean}, stddev={stddev})")
            }
            SkipReason::NoPopulation => write!(f, "no non-outlier population in any window"),
            SkipReason::NoCleanData => write!(f, "no clean data"),
        }
    }
}

/// Stage failures. The stage's own writes are not kept; prior stages' are.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to read source directory {path}: {source}")]
    SourceDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no device identifiers present; cannot build the daily outlier pivot")]
    NoDevices,
}

pub type StageResult<T> = Result<StageOutcome<T>, StageError>;

impl From<StageError> for sc_common::Error {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Store(inner) => inner.into(),
            StageError::Load(inner) => inner.into(),
            StageError::SourceDir { path, .. } => {
                sc_common::Error::SourceNotFound(path.display().to_string())
            }
            StageError::NoDevices => {
                sc_common::Error::SchemaPrerequisite(StageError::NoDevices.to_string())
            }
        }
    }
}
