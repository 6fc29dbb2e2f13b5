//! Config resolution: explicit path -> XDG -> defaults, then environment.

use crate::config::PipelineConfig;
use crate::validate::{validate, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Enables the velocity outlier filter when set to `"1"`.
pub const ENV_APPLY_VELOCITY_FILTER: &str = "APPLY_VELOCITY_FILTER";
/// Upper velocity bound used when the filter is enabled.
pub const ENV_MAX_VELOCITY: &str = "MAX_VELOCITY";
/// Number of messages requested from upstream per ingestion.
pub const ENV_BRONZE_AMOUNT: &str = "BRONZE_AMOUNT";
pub const ENV_API_URL: &str = "VT_API_URL";
pub const ENV_DATA_DIR: &str = "VT_DATA_DIR";

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },

    #[error("invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ConfigError> for vt_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidEnv { var, value } => vt_common::Error::InvalidEnv { var, value },
            other => vt_common::Error::Config(other.to_string()),
        }
    }
}

/// Candidate config file locations.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path given on the command line; must exist when set.
    pub explicit: Option<PathBuf>,
    /// User config location; silently skipped when absent.
    pub xdg: Option<PathBuf>,
}

impl ConfigPaths {
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            xdg: dirs::config_dir().map(|d| d.join("vehicle-telemetry").join("config.toml")),
        }
    }
}

/// Load a TOML config file.
pub fn load_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply environment overrides from `lookup`, returning the names of the
/// variables that were applied.
pub fn apply_env_overrides<F>(
    config: &mut PipelineConfig,
    lookup: F,
) -> Result<Vec<&'static str>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = Vec::new();

    if let Some(value) = lookup(ENV_APPLY_VELOCITY_FILTER) {
        // Only the literal "1" enables the filter.
        config.sanitize.apply_velocity_filter = value.trim() == "1";
        applied.push(ENV_APPLY_VELOCITY_FILTER);
    }
    if let Some(value) = lookup(ENV_MAX_VELOCITY) {
        config.sanitize.max_velocity = parse_env(ENV_MAX_VELOCITY, &value)?;
        applied.push(ENV_MAX_VELOCITY);
    }
    if let Some(value) = lookup(ENV_BRONZE_AMOUNT) {
        config.ingest.amount = parse_env(ENV_BRONZE_AMOUNT, &value)?;
        applied.push(ENV_BRONZE_AMOUNT);
    }
    if let Some(value) = lookup(ENV_API_URL) {
        config.ingest.api_url = value;
        applied.push(ENV_API_URL);
    }
    if let Some(value) = lookup(ENV_DATA_DIR) {
        config.storage.data_dir = PathBuf::from(value);
        applied.push(ENV_DATA_DIR);
    }

    Ok(applied)
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Resolve the configuration from files and the process environment.
pub fn resolve_config(paths: &ConfigPaths) -> Result<PipelineConfig, ConfigError> {
    resolve_config_with(paths, |var| std::env::var(var).ok())
}

/// Resolve with an injectable environment lookup.
pub fn resolve_config_with<F>(paths: &ConfigPaths, lookup: F) -> Result<PipelineConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match (&paths.explicit, &paths.xdg) {
        (Some(path), _) => {
            info!(path = %path.display(), "loading config");
            load_file(path)?
        }
        (None, Some(path)) if path.exists() => {
            info!(path = %path.display(), "loading user config");
            load_file(path)?
        }
        _ => {
            debug!("no config file, using defaults");
            PipelineConfig::default()
        }
    };

    let applied = apply_env_overrides(&mut config, lookup)?;
    if !applied.is_empty() {
        debug!(vars = ?applied, "applied environment overrides");
    }

    validate(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}
