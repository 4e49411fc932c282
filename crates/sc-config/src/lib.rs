//! Sensor Clean configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the pipeline configuration file
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - Fixed policy constants

pub mod pipeline;
pub mod policy;
pub mod resolve;
pub mod validate;

pub use pipeline::{LogFormat, LoggingConfig, PipelineConfig, TableNames};
pub use policy::{imputation_statistic, ImputationStatistic, OUTLIER_SIGMA};
pub use resolve::{resolve_config, resolve_config_with, ConfigPaths, ConfigSource, ResolvedConfig};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
