//! Batch ingestion: loader → raw upsert → ledger advance → archive.

use crate::ledger::{self, LedgerPosition};
use crate::loader;
use crate::sources::SourceDirectory;
use crate::stage::StageError;
use crate::store::Store;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of applying one source batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchApplied {
    pub source_name: String,
    pub applied_count: usize,
    pub dropped_count: u64,
    pub new_checkpoint: Option<LedgerPosition>,
}

/// A batch that could not be parsed. It stays in place for the next run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedBatch {
    pub source_name: String,
    pub reason: String,
}

/// Outcome of an ingestion stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub applied: Vec<BatchApplied>,
    pub rejected: Vec<RejectedBatch>,
    pub archived: Vec<PathBuf>,
}

impl IngestSummary {
    pub fn total_applied(&self) -> usize {
        self.applied.iter().map(|b| b.applied_count).sum()
    }
}

/// Source name of a batch: its file name without directory.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Apply the unseen suffix of one source file.
///
/// The ledger is only advanced after the raw rows are stored; any failure
/// means the batch counts as not applied.
pub fn apply_new_batch<S: Store + ?Sized>(
    store: &mut S,
    path: &Path,
) -> Result<BatchApplied, StageError> {
    let name = source_name(path);
    let checkpoint = ledger::get_checkpoint(store, &name)?;
    let outcome = loader::load_file(path, checkpoint)?;

    let applied_count = if outcome.records.is_empty() {
        0
    } else {
        store.upsert_raw(&outcome.records)?
    };
    if let Some(position) = outcome.new_checkpoint {
        ledger::advance(store, &name, position)?;
    }

    if outcome.is_empty() {
        info!(source = %name, "no new rows");
    } else {
        info!(
            source = %name,
            applied = applied_count,
            dropped = outcome.dropped,
            offset = outcome.new_checkpoint.map(|c| c.last_offset),
            "batch applied"
        );
    }

    Ok(BatchApplied {
        source_name: name,
        applied_count,
        dropped_count: outcome.dropped,
        new_checkpoint: outcome.new_checkpoint,
    })
}

/// Apply a list of files in order.
///
/// Unparsable batches are reported and skipped. Store failures abort the
/// stage; batches applied before the failure keep their effects. When an
/// archive is given, each successfully applied file is moved there.
pub fn ingest_paths<S: Store + ?Sized>(
    store: &mut S,
    paths: &[PathBuf],
    archive: Option<&SourceDirectory>,
) -> Result<IngestSummary, StageError> {
    let mut summary = IngestSummary::default();
    for path in paths {
        let applied = match apply_new_batch(store, path) {
            Ok(applied) => applied,
            Err(StageError::Load(e)) => {
                warn!(source = %path.display(), error = %e, "batch rejected");
                summary.rejected.push(RejectedBatch {
                    source_name: source_name(path),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        summary.applied.push(applied);

        if let Some(dir) = archive {
            match dir.archive(path) {
                Ok(target) => summary.archived.push(target),
                Err(e) => {
                    warn!(
                        source = %path.display(),
                        error = %e,
                        "failed to archive source; it will be re-read next run"
                    )
                }
            }
        }
    }
    Ok(summary)
}

/// Discover and apply every batch in the source directory.
pub fn ingest_all<S: Store + ?Sized>(
    store: &mut S,
    sources: &SourceDirectory,
) -> Result<IngestSummary, StageError> {
    let paths = sources.discover().map_err(|e| StageError::SourceDir {
        path: sources.dir().to_path_buf(),
        source: e,
    })?;
    info!(files = paths.len(), dir = %sources.dir().display(), "ingesting source batches");
    ingest_paths(store, &paths, Some(sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "timestamp,turbine_id,wind_speed,wind_direction,power_output\n";

    fn write_batch(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut content = HEADER.to_string();
        for r in rows {
            content.push_str(r);
            content.push('\n');
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reapplying_same_batch_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let path = write_batch(
            tmp.path(),
            "data_group_1.csv",
            &["2022-03-01 00:00:00,1,10,180,1500", "2022-03-01 01:00:00,1,11,181,1510"],
        );
        let mut store = MemoryStore::new();
        let first = apply_new_batch(&mut store, &path).unwrap();
        assert_eq!(first.applied_count, 2);
        let second = apply_new_batch(&mut store, &path).unwrap();
        assert_eq!(second.applied_count, 0);
        assert_eq!(second.new_checkpoint, None);
        assert_eq!(store.ledger_entries().unwrap().len(), 1);
    }

    #[test]
    fn appended_rows_are_picked_up() {
        let tmp = TempDir::new().unwrap();
        let rows = ["2022-03-01 00:00:00,1,10,180,1500"];
        let path = write_batch(tmp.path(), "data_group_1.csv", &rows);
        let mut store = MemoryStore::new();
        apply_new_batch(&mut store, &path).unwrap();
        write_batch(
            tmp.path(),
            "data_group_1.csv",
            &[rows[0], "2022-03-01 01:00:00,2,9,170,1400"],
        );
        let applied = apply_new_batch(&mut store, &path).unwrap();
        assert_eq!(applied.applied_count, 1);
        assert_eq!(applied.new_checkpoint.unwrap().last_offset, 2);
        assert_eq!(store.raw_measurements().unwrap().len(), 2);
    }

    #[test]
    fn ingest_all_archives_applied_and_keeps_rejected() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw");
        fs::create_dir_all(&raw).unwrap();
        write_batch(&raw, "data_group_1.csv", &["2022-03-01 00:00:00,1,10,180,1500"]);
        fs::write(raw.join("data_group_2.csv"), "when,who\n1,2\n").unwrap();
        let sources = SourceDirectory::new(&raw, "data_group_", tmp.path().join("archive"));

        let mut store = MemoryStore::new();
        let summary = ingest_all(&mut store, &sources).unwrap();
        assert_eq!(summary.total_applied(), 1);
        assert_eq!(summary.archived.len(), 1);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].source_name, "data_group_2.csv");
        assert!(!raw.join("data_group_1.csv").exists());
        assert!(raw.join("data_group_2.csv").exists());
    }

    #[test]
    fn empty_source_directory_is_success() {
        let tmp = TempDir::new().unwrap();
        let sources = SourceDirectory::new(tmp.path(), "data_group_", tmp.path().join("archive"));
        let mut store = MemoryStore::new();
        let summary = ingest_all(&mut store, &sources).unwrap();
        assert_eq!(summary, IngestSummary::default());
    }
}
