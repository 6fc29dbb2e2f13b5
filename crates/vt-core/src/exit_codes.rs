//! Exit codes for the vt-core CLI.
//!
//! Exit codes communicate the outcome of a run without requiring output
//! parsing. They are stable across releases.

use vt_common::Error;

/// Exit codes for vt-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Run completed
    Clean = 0,

    /// Configuration or environment error
    ConfigError = 10,

    /// Upstream fetch or payload error
    IngestError = 11,

    /// Schema, partition or scan-pattern error inside a pipeline stage
    PipelineError = 12,

    /// Storage or filesystem error
    IoError = 13,

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
        matches!(self, ExitCode::Clean)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Exit code for a run that failed with `err`.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::Config(_) | Error::InvalidEnv { .. } => ExitCode::ConfigError,
            Error::Fetch(_) | Error::InvalidPayload(_) => ExitCode::IngestError,
            Error::MissingColumns { .. }
            | Error::MissingPartitionColumns(_)
            | Error::SchemaMismatch(_)
            | Error::PartitionMismatch { .. }
            | Error::InvalidPartition { .. }
            | Error::InvalidPattern(_)
            | Error::Injection(_)
            | Error::Arrow(_) => ExitCode::PipelineError,
            Error::DatasetNotFound(_) | Error::Parquet(_) | Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_documented_codes() {
        assert_eq!(ExitCode::for_error(&Error::Config("x".into())).as_i32(), 10);
        assert_eq!(ExitCode::for_error(&Error::Fetch("x".into())).as_i32(), 11);
        let missing = Error::MissingPartitionColumns(vec!["hour".into()]);
        assert_eq!(ExitCode::for_error(&missing).as_i32(), 12);
        let io = Error::Io(std::io::Error::other("disk"));
        assert_eq!(ExitCode::for_error(&io).as_i32(), 13);
    }

    #[test]
    fn success_and_error_classes() {
        assert!(ExitCode::Clean.is_success());
        assert!(!ExitCode::Clean.is_error());
        assert!(ExitCode::InternalError.is_error());
    }
}
