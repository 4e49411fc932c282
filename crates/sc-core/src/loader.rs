//! Record loader.
//!
//! Parses a header-having CSV batch into measurements. The batch is re-read in
//! full every run; the ledger offset selects the unseen suffix by position:
//! with `last_offset = N` the first N data rows are skipped regardless of
//! their content.
//!
//! Rows without a usable timestamp or device id are dropped with a warning but
//! still count toward the new offset, since the skip is positional.

use crate::ledger::LedgerPosition;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sc_common::{DeviceId, Field, FieldValues, Measurement};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Column holding the timestamp.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Accepted names of the device column.
pub const DEVICE_COLUMNS: [&str; 2] = ["device_id", "turbine_id"];

/// Cell values read as an absent field.
const MISSING_MARKERS: [&str; 8] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
];

/// Errors that reject a whole batch.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source is missing required column {0:?}")]
    MissingColumn(String),

    #[error("failed to read CSV: {source}")]
    Csv {
        #[source]
        source: csv::Error,
    },
}

impl From<LoadError> for sc_common::Error {
    fn from(e: LoadError) -> Self {
        let not_found = matches!(
            &e,
            LoadError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        );
        if not_found {
            sc_common::Error::SourceNotFound(e.to_string())
        } else {
            sc_common::Error::SourceFormat(e.to_string())
        }
    }
}

/// Result of loading one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadOutcome {
    /// New, valid records in source order.
    pub records: Vec<Measurement>,
    /// Data rows past the checkpoint, valid or not.
    pub rows_read: u64,
    /// Rows past the checkpoint that were dropped as invalid.
    pub dropped: u64,
    /// Position to record; `None` when no row was read.
    pub new_checkpoint: Option<LedgerPosition>,
}

impl LoadOutcome {
    pub fn is_empty(&self) -> bool {
        self.rows_read == 0
    }
}

/// Header positions of the known columns.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    timestamp: usize,
    device: usize,
    fields: [Option<usize>; 3],
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let timestamp = find(TIMESTAMP_COLUMN)
            .ok_or_else(|| LoadError::MissingColumn(TIMESTAMP_COLUMN.to_string()))?;
        let device = DEVICE_COLUMNS
            .iter()
            .find_map(|&name| find(name))
            .ok_or_else(|| LoadError::MissingColumn(DEVICE_COLUMNS[0].to_string()))?;
        let mut fields = [None; 3];
        for (slot, field) in fields.iter_mut().zip(Field::ALL) {
            *slot = find(field.column());
        }
        Ok(Self {
            timestamp,
            device,
            fields,
        })
    }
}

/// Load the new rows of a source file.
pub fn load_file(
    path: &Path,
    checkpoint: Option<LedgerPosition>,
) -> Result<LoadOutcome, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_new_records(file, checkpoint)
}

/// Load the rows of a batch that lie past `checkpoint`.
pub fn load_new_records<R: Read>(
    reader: R,
    checkpoint: Option<LedgerPosition>,
) -> Result<LoadOutcome, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| LoadError::Csv { source: e })?
        .clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let skip = checkpoint.map(|c| c.last_offset).unwrap_or(0);
    let mut records = Vec::new();
    let mut rows_read = 0u64;
    let mut dropped = 0u64;
    let mut last_timestamp = None;

    for (idx, row) in csv_reader.records().enumerate() {
        let position = idx as u64;
        // Row numbers in logs are 1-based data rows.
        let row_number = position + 1;
        let row = match row {
            Err(e) if e.is_io_error() => return Err(LoadError::Csv { source: e }),
            other => other,
        };
        if position < skip {
            continue;
        }
        rows_read += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(row = row_number, error = %e, "dropping malformed row");
                dropped += 1;
                continue;
            }
        };
        match parse_row(&row, &columns, row_number) {
            Some(m) => {
                last_timestamp = Some(m.timestamp);
                records.push(m);
            }
            None => dropped += 1,
        }
    }

    let new_checkpoint = (rows_read > 0).then(|| LedgerPosition {
        last_timestamp: last_timestamp
            .or(checkpoint.map(|c| c.last_timestamp))
            .unwrap_or(epoch()),
        last_offset: skip + rows_read,
    });

    debug!(
        skipped = skip,
        rows_read,
        dropped,
        valid = records.len(),
        "batch loaded"
    );

    Ok(LoadOutcome {
        records,
        rows_read,
        dropped,
        new_checkpoint,
    })
}

fn epoch() -> NaiveDateTime {
    DateTime::UNIX_EPOCH.naive_utc()
}

fn parse_row(
    row: &csv::StringRecord,
    columns: &ColumnMap,
    row_number: u64,
) -> Option<Measurement> {
    let Some(timestamp) = row.get(columns.timestamp).and_then(parse_timestamp) else {
        warn!(
            row = row_number,
            value = row.get(columns.timestamp).unwrap_or(""),
            "dropping row without a valid timestamp"
        );
        return None;
    };
    let Some(device_id) = row.get(columns.device).and_then(DeviceId::parse) else {
        warn!(
            row = row_number,
            value = row.get(columns.device).unwrap_or(""),
            "dropping row without a valid device id"
        );
        return None;
    };

    let mut values = FieldValues::default();
    for (idx, field) in columns.fields.iter().zip(Field::ALL) {
        let cell = idx.and_then(|i| row.get(i)).unwrap_or("");
        values.set(field, parse_value(cell, field, row_number));
    }
    Some(Measurement::new(device_id, timestamp, values))
}

/// Parse a timestamp cell in any of the accepted layouts.
pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(cell, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(cell) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(cell, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a field cell. Missing markers and unparsable text read as absent;
/// zero is a real reading.
pub fn parse_value(cell: &str, field: Field, row_number: u64) -> Option<f64> {
    let cell = cell.trim();
    if MISSING_MARKERS.contains(&cell) {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            debug!(
                row = row_number,
                field = %field,
                value = cell,
                "unparsable value read as absent"
            );
            None
        }
    }
}
