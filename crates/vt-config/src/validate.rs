//! Semantic validation of a resolved configuration.

use crate::config::PipelineConfig;
use std::fmt;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Check cross-field constraints. Collects every problem instead of
/// stopping at the first.
pub fn validate(config: &PipelineConfig) -> ValidationResult {
    let mut errors = Vec::new();
    let mut push = |field: &'static str, message: String| {
        errors.push(ValidationError { field, message })
    };

    let s = &config.sanitize;
    if s.min_velocity > s.max_velocity {
        push(
            "sanitize.min_velocity",
            format!(
                "must not exceed max_velocity ({} > {})",
                s.min_velocity, s.max_velocity
            ),
        );
    }
    if config.ingest.amount == 0 {
        push("ingest.amount", "must be positive".to_string());
    }
    if config.ingest.timeout_secs == 0 {
        push("ingest.timeout_secs", "must be positive".to_string());
    }
    if config.report.top_n == 0 {
        push("report.top_n", "must be positive".to_string());
    }
    if config.scan.columns.is_empty() {
        push("scan.columns", "at least one column is required".to_string());
    }
    if config.scan.patterns.iter().all(|p| p.trim().is_empty()) {
        push("scan.patterns", "at least one pattern is required".to_string());
    }
    let storage = &config.storage;
    for (field, name) in [
        ("storage.bronze", &storage.bronze),
        ("storage.silver", &storage.silver),
        ("storage.gold", &storage.gold),
        ("storage.injected", &storage.injected),
    ] {
        if name.is_empty() || name.contains(['/', '\\']) {
            push(field, format!("invalid dataset name {name:?}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
