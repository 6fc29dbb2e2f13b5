//! Error types for the vehicle telemetry pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the vehicle telemetry pipeline.
///
/// Row-level defects (null VIN, bad gear token, duplicates) are never
/// errors; they are filtered and counted by the owning stage. Everything
/// here aborts the run.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: String, value: String },

    #[error("missing required column(s) for {stage}: {}", .columns.join(", "))]
    MissingColumns { stage: String, columns: Vec<String> },

    #[error("missing partition column(s): {}", .0.join(", "))]
    MissingPartitionColumns(Vec<String>),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    // Ingestion errors (20-29)
    #[error("upstream fetch failed: {0}")]
    Fetch(String),

    #[error("invalid upstream payload: {0}")]
    InvalidPayload(String),

    // Pipeline errors (30-39)
    #[error("partition key mismatch at row {row}: {detail}")]
    PartitionMismatch { row: usize, detail: String },

    #[error("invalid partition value in column {column}: {detail}")]
    InvalidPartition { column: String, detail: String },

    #[error("invalid scan pattern: {0}")]
    InvalidPattern(String),

    #[error("cannot inject probe row: {0}")]
    Injection(String),

    // Storage errors (40-49)
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidEnv { .. } => 11,
            Error::MissingColumns { .. } => 12,
            Error::MissingPartitionColumns(_) => 13,
            Error::SchemaMismatch(_) => 14,
            Error::Fetch(_) => 20,
            Error::InvalidPayload(_) => 21,
            Error::PartitionMismatch { .. } => 30,
            Error::InvalidPartition { .. } => 31,
            Error::InvalidPattern(_) => 32,
            Error::Injection(_) => 33,
            Error::DatasetNotFound(_) => 40,
            Error::Arrow(_) => 41,
            Error::Parquet(_) => 42,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Whether this is a schema or configuration defect, i.e. the run was
    /// misconfigured rather than the data being bad.
    pub fn is_config_defect(&self) -> bool {
        self.code() < 20
    }
}
