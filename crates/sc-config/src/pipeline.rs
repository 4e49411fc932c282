//! Pipeline configuration types.
//!
//! A single immutable `PipelineConfig` value is threaded through every
//! component constructor; nothing reads configuration from globals.

use sc_common::WindowLabel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::validate::ValidationError;

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema_version: String,

    /// Directory holding the persisted tables.
    pub data_dir: PathBuf,

    /// Directory scanned for source batches.
    pub source_dir: PathBuf,

    /// Directory receiving applied source batches.
    pub archive_dir: PathBuf,

    /// File name prefix a source batch must carry.
    pub source_prefix: String,

    /// Window whose latest statistics fill absent fields.
    pub imputation_window: WindowLabel,

    pub tables: TableNames,

    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            data_dir: PathBuf::from("data/store"),
            source_dir: PathBuf::from("data/raw_data"),
            archive_dir: PathBuf::from("data/archive"),
            source_prefix: "data_group_".to_string(),
            imputation_window: WindowLabel::Full,
            tables: TableNames::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a file. `.json` parses as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| ValidationError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_toml(&content)
        }
    }

    pub fn parse_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Parse(e.to_string()))
    }

    pub fn parse_toml(text: &str) -> Result<Self, ValidationError> {
        toml::from_str(text).map_err(|e| ValidationError::Parse(e.to_string()))
    }

    /// Resolve relative directories against a base directory.
    pub fn rebased(mut self, base: &Path) -> Self {
        for dir in [&mut self.data_dir, &mut self.source_dir, &mut self.archive_dir] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        if let Some(log_dir) = self.logging.log_dir.as_mut() {
            if log_dir.is_relative() {
                *log_dir = base.join(&*log_dir);
            }
        }
        self
    }
}

/// Names of the persisted tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub raw: String,
    pub ledger: String,
    pub outliers: String,
    pub reference_statistics: String,
    pub clean: String,
    pub period_stats: String,
    pub daily_outlier_counts: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            raw: "raw_data".to_string(),
            ledger: "ingestion_ledger".to_string(),
            outliers: "outliers".to_string(),
            reference_statistics: "reference_statistics".to_string(),
            clean: "clean_data".to_string(),
            period_stats: "period_stats".to_string(),
            daily_outlier_counts: "daily_outlier_counts".to_string(),
        }
    }
}

impl TableNames {
    /// All names in a fixed order, paired with their role.
    pub fn all(&self) -> [(&'static str, &str); 7] {
        [
            ("raw", &self.raw),
            ("ledger", &self.ledger),
            ("outliers", &self.outliers),
            ("reference_statistics", &self.reference_statistics),
            ("clean", &self.clean),
            ("period_stats", &self.period_stats),
            ("daily_outlier_counts", &self.daily_outlier_counts),
        ]
    }
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// When set, logs go to a timestamped file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
            log_dir: None,
        }
    }
}
