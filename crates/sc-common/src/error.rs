//! Error types for Sensor Clean.

use thiserror::Error;

/// Result type alias for Sensor Clean operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type surfaced at the CLI boundary.
///
/// Engine crates keep their own narrow error enums and convert into this one
/// when an error leaves a pipeline stage.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file {path}: {reason}")]
    InvalidConfigFile { path: String, reason: String },

    // Source errors (20-29)
    #[error("source batch rejected: {0}")]
    SourceFormat(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    // Store errors (30-39)
    #[error("store operation failed: {0}")]
    TransientStore(String),

    // Aggregation errors (40-49)
    #[error("schema prerequisite not met: {0}")]
    SchemaPrerequisite(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfigFile { .. } => 11,
            Error::SourceFormat(_) => 20,
            Error::SourceNotFound(_) => 21,
            Error::TransientStore(_) => 30,
            Error::SchemaPrerequisite(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }
}
