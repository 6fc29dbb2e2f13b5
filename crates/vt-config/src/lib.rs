//! Vehicle telemetry pipeline configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the pipeline config file (TOML)
//! - Config resolution (CLI path → XDG → defaults, then environment)
//! - Semantic validation

pub mod config;
pub mod resolve;
pub mod validate;

pub use config::{
    IngestConfig, PipelineConfig, ReportConfig, SanitizeConfig, ScanConfig, StorageConfig,
    DEFAULT_INJECTION_PATTERN,
};
pub use resolve::{resolve_config, resolve_config_with, ConfigError, ConfigPaths};
pub use validate::{ValidationError, ValidationResult};
