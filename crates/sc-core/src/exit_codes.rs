//! Exit codes for the sc-core CLI.
//!
//! Exit codes communicate the outcome class without requiring output parsing.
//! They are stable across releases.

use crate::pipeline::CycleReport;

/// Exit codes for sc-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every stage completed
    Clean = 0,

    /// Completed, but at least one stage had nothing to do
    Skipped = 1,

    /// Configuration error
    ConfigError = 10,

    /// Source batch missing or unreadable
    SourceError = 11,

    /// Store operation failed
    StoreError = 12,

    /// Summary prerequisites not met (no devices for the pivot)
    SchemaPrerequisite = 13,

    /// I/O error
    IoError = 14,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::Skipped)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Map an `sc_common::Error::code` to an exit code.
    pub fn from_error_code(code: u32) -> Self {
        match code {
            10..=19 => ExitCode::ConfigError,
            20..=29 => ExitCode::SourceError,
            30..=39 => ExitCode::StoreError,
            40..=49 => ExitCode::SchemaPrerequisite,
            60..=69 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }

    pub fn for_error(err: &sc_common::Error) -> Self {
        Self::from_error_code(err.code())
    }

    /// Outcome class of a cycle.
    pub fn for_report(report: &CycleReport) -> Self {
        if let Some(failure) = report.failure() {
            return failure
                .error_code
                .map(Self::from_error_code)
                .unwrap_or(ExitCode::InternalError);
        }
        if report.any_skipped() {
            ExitCode::Skipped
        } else {
            ExitCode::Clean
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_classes() {
        assert_eq!(ExitCode::from_error_code(11), ExitCode::ConfigError);
        assert_eq!(ExitCode::from_error_code(21), ExitCode::SourceError);
        assert_eq!(ExitCode::from_error_code(30), ExitCode::StoreError);
        assert_eq!(ExitCode::from_error_code(40), ExitCode::SchemaPrerequisite);
        assert_eq!(ExitCode::from_error_code(61), ExitCode::IoError);
        assert_eq!(ExitCode::from_error_code(7), ExitCode::InternalError);
    }

    #[test]
    fn success_and_error_partition() {
        assert!(ExitCode::Skipped.is_success());
        assert!(!ExitCode::Skipped.is_error());
        assert!(ExitCode::SchemaPrerequisite.is_error());
        assert_eq!(i32::from(ExitCode::StoreError), 12);
    }
}
