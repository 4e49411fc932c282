//! Semantic validation of the pipeline configuration.

use crate::pipeline::PipelineConfig;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported config schema version: {0}")]
    UnsupportedVersion(String),

    #[error("source_prefix must not be empty")]
    EmptyPrefix,

    #[error("table name for {role} must not be empty")]
    EmptyTableName { role: String },

    #[error("table name {name} is used by more than one table")]
    DuplicateTableName { name: String },

    #[error("source_dir and archive_dir must differ ({0})")]
    ArchiveIsSource(PathBuf),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for sc_common::Error {
    fn from(e: ValidationError) -> Self {
        sc_common::Error::Config(e.to_string())
    }
}

impl PipelineConfig {
    /// Check the semantic constraints serde cannot express.
    pub fn validate(&self) -> ValidationResult<()> {
        if !sc_common::schema::is_compatible(&self.schema_version) {
            return Err(ValidationError::UnsupportedVersion(
                self.schema_version.clone(),
            ));
        }
        if self.source_prefix.trim().is_empty() {
            return Err(ValidationError::EmptyPrefix);
        }
        let mut seen = HashSet::new();
        for (role, name) in self.tables.all() {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyTableName {
                    role: role.to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(ValidationError::DuplicateTableName {
                    name: name.to_string(),
                });
            }
        }
        if self.source_dir == self.archive_dir {
            return Err(ValidationError::ArchiveIsSource(self.source_dir.clone()));
        }
        Ok(())
    }
}
