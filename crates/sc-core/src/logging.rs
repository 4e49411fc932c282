//! Tracing subscriber setup.
//!
//! Logs always go to stderr (or a file under `log_dir`) so stdout carries
//! only command output. `RUST_LOG` wins over the configured level; each `-v`
//! raises the configured level one step.

use chrono::Utc;
use sc_config::{LogFormat, LoggingConfig};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log filter {0:?}")]
    Filter(String),

    #[error("tracing subscriber already installed: {0}")]
    Install(String),
}

/// Effective logging choices after CLI overrides.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_config(config: &LoggingConfig, format: Option<LogFormat>, verbosity: u8) -> Self {
        Self {
            level: raise_level(&config.level, verbosity),
            format: format.unwrap_or(config.format),
            log_dir: config.log_dir.clone(),
        }
    }
}

/// Bump a plain level name by `steps`; filter directives are left alone.
fn raise_level(level: &str, steps: u8) -> String {
    const LADDER: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let Some(idx) = LADDER.iter().position(|l| l.eq_ignore_ascii_case(level.trim())) else {
        return level.to_string();
    };
    let raised = (idx + steps as usize).min(LADDER.len() - 1);
    LADDER[raised].to_string()
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|_| LoggingError::Filter(level.to_string())),
    }
}

/// Path of the log file for a run started now.
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("sc_{}.log", Utc::now().format("%Y-%m-%dT%H-%M-%S")))
}

/// Install the global subscriber. Returns the log file path when logging
/// to a file.
pub fn init_logging(settings: &LogSettings) -> Result<Option<PathBuf>, LoggingError> {
    let filter = build_filter(&settings.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let Some(dir) = &settings.log_dir else {
        let installed = match settings.format {
            LogFormat::Human => builder.with_writer(std::io::stderr).try_init(),
            LogFormat::Json => builder.json().with_writer(std::io::stderr).try_init(),
        };
        installed.map_err(|e| LoggingError::Install(e.to_string()))?;
        return Ok(None);
    };

    let path = log_file_path(dir);
    let file = fs::create_dir_all(dir)
        .and_then(|_| File::create(&path))
        .map_err(|e| LoggingError::LogFile {
            path: path.clone(),
            source: e,
        })?;
    let writer = Mutex::new(file);
    let installed = match settings.format {
        LogFormat::Human => builder.with_ansi(false).with_writer(writer).try_init(),
        LogFormat::Json => builder.json().with_writer(writer).try_init(),
    };
    installed.map_err(|e| LoggingError::Install(e.to_string()))?;
    Ok(Some(path))
}
