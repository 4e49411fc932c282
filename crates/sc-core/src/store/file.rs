//! JSON-lines file store.
//!
//! One `<table>.jsonl` file per table inside the data directory. All tables
//! are loaded on open. Keyed tables are rewritten through a temp file and an
//! atomic rename; append-only tables (ledger, reference statistics) are
//! appended. The in-memory view only changes after the file write succeeded.
//! An unparsable unterminated last line is treated as an interrupted append
//! and cut off on open.

use super::memory::Tables;
use super::{Store, StoreError, StoreResult};
use sc_common::{
    CleanMeasurement, DailyOutlierCount, IngestionCheckpoint, Measurement, OutlierRecord,
    PeriodStats, ReferenceStatistic,
};
use sc_config::TableNames;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TABLE_EXT: &str = "jsonl";

/// File-backed store rooted at a data directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    names: TableNames,
    tables: Tables,
}

impl FileStore {
    /// Open (creating if needed) the store in `dir`.
    pub fn open(dir: impl Into<PathBuf>, names: &TableNames) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let mut tables = Tables::default();
        for m in load_table::<Measurement>(&dir, &names.raw)? {
            tables.raw.insert(m.key(), m);
        }
        tables.ledger = load_table(&dir, &names.ledger)?;
        for o in load_table::<OutlierRecord>(&dir, &names.outliers)? {
            tables.outliers.insert(o.key(), o);
        }
        tables.statistics = load_table(&dir, &names.reference_statistics)?;
        for c in load_table::<CleanMeasurement>(&dir, &names.clean)? {
            tables.clean.insert(c.key(), c);
        }
        for p in load_table::<PeriodStats>(&dir, &names.period_stats)? {
            tables.period_stats.insert((p.day, p.device_id), p);
        }
        tables.daily_counts = load_table(&dir, &names.daily_outlier_counts)?;

        info!(
            dir = %dir.display(),
            raw = tables.raw.len(),
            clean = tables.clean.len(),
            outliers = tables.outliers.len(),
            "store opened"
        );

        Ok(Self {
            dir,
            names: names.clone(),
            tables,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        table_path(&self.dir, table)
    }

    /// Replace a table file atomically.
    fn rewrite<I>(&self, table: &str, rows: I) -> StoreResult<()>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let content = encode_rows(table, rows)?;
        let path = self.table_path(table);
        let tmp_path = path.with_extension(format!("{TABLE_EXT}.tmp"));
        fs::write(&tmp_path, content).map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        debug!(table, path = %path.display(), "table rewritten");
        Ok(())
    }

    /// Append rows to a table file.
    fn append<T: Serialize>(&self, table: &str, rows: &[T]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let content = encode_rows(table, rows)?;
        let path = self.table_path(table);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
        debug!(table, rows = rows.len(), "rows appended");
        Ok(())
    }
}

fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.{TABLE_EXT}"))
}

fn encode_rows<I>(table: &str, rows: I) -> StoreResult<String>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    let mut content = String::new();
    for row in rows {
        let line = serde_json::to_string(&row).map_err(|e| StoreError::Encode {
            table: table.to_string(),
            source: e,
        })?;
        content.push_str(&line);
        content.push('\n');
    }
    Ok(content)
}

fn load_table<T: DeserializeOwned>(dir: &Path, table: &str) -> StoreResult<Vec<T>> {
    let path = table_path(dir, table);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path).map_err(|e| StoreError::Io {
        path: path.clone(),
        source: e,
    })?;

    // An unterminated final line is an interrupted append.
    let torn_from = (!content.is_empty() && !content.ends_with('\n'))
        .then(|| content.rfind('\n').map_or(0, |i| i + 1));

    let mut rows = Vec::new();
    let mut truncated = false;
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(row) => rows.push(row),
            Err(e) => match torn_from {
                Some(offset) if offset + line.len() == content.len() => {
                    warn!(table, line = idx + 1, error = %e, "dropping torn trailing row");
                    truncate_to(&path, offset)?;
                    truncated = true;
                }
                _ => {
                    return Err(StoreError::Corrupt {
                        table: table.to_string(),
                        line: idx + 1,
                        source: e,
                    })
                }
            },
        }
    }
    if torn_from.is_some() && !truncated {
        // Terminate the last row so the next append starts on its own line.
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(b"\n"))
            .map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
    }
    Ok(rows)
}

fn truncate_to(path: &Path, len: usize) -> StoreResult<()> {
    fs::OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(len as u64))
        .map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

impl Store for FileStore {
    fn raw_measurements(&self) -> StoreResult<Vec<Measurement>> {
        Ok(self.tables.raw.values().cloned().collect())
    }

    fn upsert_raw(&mut self, records: &[Measurement]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut next = self.tables.raw.clone();
        for m in records {
            next.insert(m.key(), m.clone());
        }
        self.rewrite(&self.names.raw, next.values())?;
        self.tables.raw = next;
        Ok(records.len())
    }

    fn ledger_entries(&self) -> StoreResult<Vec<IngestionCheckpoint>> {
        Ok(self.tables.ledger.clone())
    }

    fn append_checkpoint(&mut self, checkpoint: &IngestionCheckpoint) -> StoreResult<()> {
        self.append(&self.names.ledger, std::slice::from_ref(checkpoint))?;
        self.tables.ledger.push(checkpoint.clone());
        Ok(())
    }

    fn outliers(&self) -> StoreResult<Vec<OutlierRecord>> {
        Ok(self.tables.outliers.values().cloned().collect())
    }

    fn upsert_outliers(&mut self, records: &[OutlierRecord]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut next = self.tables.outliers.clone();
        for o in records {
            next.insert(o.key(), o.clone());
        }
        self.rewrite(&self.names.outliers, next.values())?;
        self.tables.outliers = next;
        Ok(records.len())
    }

    fn reference_statistics(&self) -> StoreResult<Vec<ReferenceStatistic>> {
        Ok(self.tables.statistics.clone())
    }

    fn append_reference_statistics(&mut self, stats: &[ReferenceStatistic]) -> StoreResult<()> {
        self.append(&self.names.reference_statistics, stats)?;
        self.tables.statistics.extend_from_slice(stats);
        Ok(())
    }

    fn clean_measurements(&self) -> StoreResult<Vec<CleanMeasurement>> {
        Ok(self.tables.clean.values().cloned().collect())
    }

    fn insert_clean_ignoring_existing(&mut self, rows: &[CleanMeasurement]) -> StoreResult<usize> {
        let fresh: Vec<CleanMeasurement> = rows
            .iter()
            .filter(|r| !self.tables.clean.contains_key(&r.key()))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        let mut next = self.tables.clean.clone();
        let mut inserted = 0;
        for row in fresh {
            if next.insert(row.key(), row).is_none() {
                inserted += 1;
            }
        }
        self.rewrite(&self.names.clean, next.values())?;
        self.tables.clean = next;
        Ok(inserted)
    }

    fn period_stats(&self) -> StoreResult<Vec<PeriodStats>> {
        Ok(self.tables.period_stats.values().cloned().collect())
    }

    fn upsert_period_stats(&mut self, rows: &[PeriodStats]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut next = self.tables.period_stats.clone();
        for row in rows {
            next.insert((row.day, row.device_id), row.clone());
        }
        self.rewrite(&self.names.period_stats, next.values())?;
        self.tables.period_stats = next;
        Ok(rows.len())
    }

    fn daily_outlier_counts(&self) -> StoreResult<Vec<DailyOutlierCount>> {
        Ok(self.tables.daily_counts.clone())
    }

    fn replace_daily_outlier_counts(&mut self, rows: &[DailyOutlierCount]) -> StoreResult<()> {
        self.rewrite(&self.names.daily_outlier_counts, rows)?;
        self.tables.daily_counts = rows.to_vec();
        Ok(())
    }
}
