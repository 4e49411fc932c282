//! Pipeline orchestration.
//!
//! Stages run strictly in order, each committing before the next reads:
//!
//! ```text
//! ingest ──► detect_outliers ──► reference_statistics ──► build_clean
//!                                                              │
//!                     outlier_pivot ◄── period_stats ◄─────────┘
//! ```
//!
//! A failed stage halts the cycle; everything committed by earlier stages
//! stays. Skipped stages do not halt. Retrying is left to the caller.

use crate::aggregate::{rebuild_outlier_pivot, refresh_period_stats};
use crate::clean::build_clean_dataset;
use crate::detector::detect_outliers;
use crate::ingest::{self, BatchApplied};
use crate::reference::refresh_statistics;
use crate::sources::SourceDirectory;
use crate::stage::{SkipReason, StageError, StageOutcome, StageResult};
use crate::store::Store;
use sc_common::RunId;
use sc_config::PipelineConfig;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, info_span, warn};

/// Named pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Ingest,
    DetectOutliers,
    ReferenceStatistics,
    BuildClean,
    PeriodStats,
    OutlierPivot,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageName::Ingest => "ingest",
            StageName::DetectOutliers => "detect_outliers",
            StageName::ReferenceStatistics => "reference_statistics",
            StageName::BuildClean => "build_clean",
            StageName::PeriodStats => "period_stats",
            StageName::OutlierPivot => "outlier_pivot",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
}

/// What happened to one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: StageName,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `sc_common::Error::code` of the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub duration_ms: u64,
}

/// Ordered stage reports of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub run_id: RunId,
    pub stages: Vec<StageReport>,
    pub success: bool,
}

impl CycleReport {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            stages: Vec::new(),
            success: true,
        }
    }

    pub fn stage(&self, name: StageName) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn failure(&self) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.status == StageStatus::Failed)
    }

    pub fn any_skipped(&self) -> bool {
        self.stages.iter().any(|s| s.status == StageStatus::Skipped)
    }
}

/// The engine: immutable configuration plus the store it works on.
#[derive(Debug)]
pub struct Pipeline<S: Store> {
    config: PipelineConfig,
    store: S,
}

impl<S: Store> Pipeline<S> {
    pub fn new(config: PipelineConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Apply one source file without archiving it.
    pub fn apply_new_batch(&mut self, path: &Path) -> Result<BatchApplied, StageError> {
        ingest::apply_new_batch(&mut self.store, path)
    }

    /// Ingest every batch in the configured source directory.
    pub fn ingest(&mut self) -> CycleReport {
        let mut report = CycleReport::new(RunId::new());
        self.ingest_into(&mut report);
        report
    }

    /// Ingest explicit files. They are not archived.
    pub fn ingest_files(&mut self, paths: &[PathBuf]) -> CycleReport {
        let mut report = CycleReport::new(RunId::new());
        self.run_stage(&mut report, StageName::Ingest, |store, _| {
            ingest::ingest_paths(store, paths, None).map(StageOutcome::Completed)
        });
        report
    }

    /// Detector → statistics → clean builder.
    pub fn run_cleaning_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::new(RunId::new());
        self.cleaning_into(&mut report);
        report
    }

    /// Period stats → daily outlier pivot.
    pub fn run_summary_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::new(RunId::new());
        self.summary_into(&mut report);
        report
    }

    /// Ingest → cleaning → summary, halting at the first failure.
    pub fn run_all(&mut self) -> CycleReport {
        let mut report = CycleReport::new(RunId::new());
        info!(run_id = %report.run_id, "pipeline run started");
        let _ = self.ingest_into(&mut report)
            && self.cleaning_into(&mut report)
            && self.summary_into(&mut report);
        info!(run_id = %report.run_id, success = report.success, "pipeline run finished");
        report
    }

    fn ingest_into(&mut self, report: &mut CycleReport) -> bool {
        self.run_stage(report, StageName::Ingest, |store, config| {
            let sources = SourceDirectory::from_config(config);
            ingest::ingest_all(store, &sources).map(StageOutcome::Completed)
        })
    }

    fn cleaning_into(&mut self, report: &mut CycleReport) -> bool {
        self.run_stage(report, StageName::DetectOutliers, |store, _| {
            detect_outliers(store)
        }) && self.run_stage(report, StageName::ReferenceStatistics, |store, _| {
            refresh_statistics(store)
        }) && self.run_stage(report, StageName::BuildClean, |store, config| {
            build_clean_dataset(store, config.imputation_window)
        })
    }

    fn summary_into(&mut self, report: &mut CycleReport) -> bool {
        self.run_stage(report, StageName::PeriodStats, |store, _| {
            refresh_period_stats(store)
        }) && self.run_stage(report, StageName::OutlierPivot, |store, _| {
            rebuild_outlier_pivot(store)
        })
    }

    /// Run one stage and record it. Returns whether the cycle may continue.
    fn run_stage<T, F>(&mut self, report: &mut CycleReport, stage: StageName, f: F) -> bool
    where
        T: Serialize,
        F: FnOnce(&mut S, &PipelineConfig) -> StageResult<T>,
    {
        let _span = info_span!("stage", %stage, run_id = %report.run_id).entered();
        let started = Instant::now();
        let result = f(&mut self.store, &self.config);
        let duration_ms = started.elapsed().as_millis() as u64;

        let entry = match result {
            Ok(StageOutcome::Completed(payload)) => {
                info!(duration_ms, "stage completed");
                StageReport {
                    stage,
                    status: StageStatus::Completed,
                    skip_reason: None,
                    error: None,
                    error_code: None,
                    detail: serde_json::to_value(&payload).ok(),
                    duration_ms,
                }
            }
            Ok(StageOutcome::Skipped(reason)) => {
                info!(reason = %reason, "stage skipped");
                StageReport {
                    stage,
                    status: StageStatus::Skipped,
                    skip_reason: Some(reason),
                    error: None,
                    error_code: None,
                    detail: None,
                    duration_ms,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let code = sc_common::Error::from(e).code();
                error!(error = %message, code, "stage failed; halting cycle");
                StageReport {
                    stage,
                    status: StageStatus::Failed,
                    skip_reason: None,
                    error: Some(message),
                    error_code: Some(code),
                    detail: None,
                    duration_ms,
                }
            }
        };

        let failed = entry.status == StageStatus::Failed;
        report.stages.push(entry);
        if failed {
            report.success = false;
            warn!("downstream stages not run");
        }
        !failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use sc_common::{DeviceId, FieldValues, Measurement};

    fn reading(device: i64, hour: u32, output: f64) -> Measurement {
        Measurement::new(
            DeviceId(device),
            NaiveDate::from_ymd_opt(2022, 3, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            FieldValues::new(Some(10.0), Some(180.0), Some(output)),
        )
    }

    fn pipeline_with(raw: &[Measurement]) -> Pipeline<MemoryStore> {
        let mut store = MemoryStore::new();
        store.upsert_raw(raw).unwrap();
        Pipeline::new(PipelineConfig::default(), store)
    }

    #[test]
    fn cleaning_cycle_runs_all_three_stages() {
        let mut raw: Vec<_> = (0..12).map(|h| reading(1, h, 1000.0 + h as f64)).collect();
        raw.push(reading(2, 13, 50_000.0));
        let mut pipeline = pipeline_with(&raw);
        let report = pipeline.run_cleaning_cycle();
        assert!(report.success);
        let names: Vec<_> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            names,
            vec![
                StageName::DetectOutliers,
                StageName::ReferenceStatistics,
                StageName::BuildClean
            ]
        );
        let store = pipeline.store();
        assert_eq!(store.outliers().unwrap().len(), 1);
        assert_eq!(store.clean_measurements().unwrap().len(), 12);
    }

    #[test]
    fn summary_failure_is_reported_with_code() {
        let mut pipeline = pipeline_with(&[]);
        let report = pipeline.run_summary_cycle();
        assert!(!report.success);
        assert_eq!(report.stages[0].status, StageStatus::Skipped);
        let failure = report.failure().unwrap();
        assert_eq!(failure.stage, StageName::OutlierPivot);
        assert_eq!(failure.error_code, Some(40));
    }

    #[test]
    fn skipped_stages_do_not_halt() {
        let raw: Vec<_> = (0..3).map(|h| reading(1, h, 5.0)).collect();
        let mut pipeline = pipeline_with(&raw);
        let report = pipeline.run_cleaning_cycle();
        assert!(report.success);
        assert!(report.any_skipped());
        assert_eq!(report.stages.len(), 3);
        assert_eq!(
            report.stage(StageName::DetectOutliers).unwrap().status,
            StageStatus::Skipped
        );
        assert_eq!(pipeline.store().clean_measurements().unwrap().len(), 3);
    }

    #[test]
    fn report_serializes_stage_detail() {
        let raw: Vec<_> = (0..4).map(|h| reading(1, h, 100.0 * (h + 1) as f64)).collect();
        let mut pipeline = pipeline_with(&raw);
        let report = pipeline.run_cleaning_cycle();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["stages"][0]["stage"], "detect_outliers");
        assert_eq!(json["stages"][0]["detail"]["population"], "raw");
    }
}
