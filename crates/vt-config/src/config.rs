//! Typed pipeline configuration.
//!
//! Every field has a default so a partial TOML file (or none at all) is a
//! valid configuration. Sections mirror the pipeline tiers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default regex used by the injection scanner: quoted strings, statement
/// separators, and SQL keywords.
pub const DEFAULT_INJECTION_PATTERN: &str = r"(?:'(?:''|[^'])*')|(?:;)|(?:\b(?:ALTER|CREATE|DELETE|DROP|EXEC(?:UTE)?|INSERT(?: +INTO)?|MERGE|SELECT|UPDATE|UNION(?: +ALL)?)\b)";

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub sanitize: SanitizeConfig,
    pub report: ReportConfig,
    pub scan: ScanConfig,
}

/// Dataset locations. Dataset names are directories under `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub bronze: String,
    pub silver: String,
    pub gold: String,
    pub injected: String,
    /// Relative paths are resolved against `data_dir`.
    pub reports_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            bronze: "messages_bronze".to_string(),
            silver: "messages_silver".to_string(),
            gold: "messages_gold".to_string(),
            injected: "messages_bronze_injected".to_string(),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

impl StorageConfig {
    pub fn reports_path(&self) -> PathBuf {
        resolve_under(&self.data_dir, &self.reports_dir)
    }
}

fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Upstream fetch settings for the bronze ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub api_url: String,
    /// Number of messages requested per fetch.
    pub amount: u32,
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:9900/upstream/vehicle_messages".to_string(),
            amount: 10_000,
            timeout_secs: 15,
        }
    }
}

/// Sanitation engine options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Enables the velocity outlier filter.
    pub apply_velocity_filter: bool,
    pub min_velocity: i64,
    pub max_velocity: i64,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            apply_velocity_filter: false,
            min_velocity: 0,
            max_velocity: 300,
        }
    }
}

impl SanitizeConfig {
    /// Configuration with the velocity filter enabled over `[0, max]`.
    pub fn with_velocity_filter(max_velocity: i64) -> Self {
        Self {
            apply_velocity_filter: true,
            max_velocity,
            ..Self::default()
        }
    }
}

/// Top-speed report options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Maximum rows per hour bucket.
    pub top_n: usize,
    pub file_name: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            file_name: "top_fastest_per_hour.csv".to_string(),
        }
    }
}

/// Injection scanner options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub columns: Vec<String>,
    pub patterns: Vec<String>,
    pub report_file: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            columns: vec!["vin".to_string()],
            patterns: vec![DEFAULT_INJECTION_PATTERN.to_string()],
            report_file: "sql_injection_report.csv".to_string(),
        }
    }
}
