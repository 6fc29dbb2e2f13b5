//! Run and record identity types.
//!
//! A telemetry reading is uniquely identified by its (vin, timestamp) pair.
//! A pipeline invocation is identified by a [`RunId`] attached to its logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vehicle identification number wrapper.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vin(pub String);

impl Vin {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity key of one logical telemetry reading.
///
/// `timestamp` is `None` only for bronze rows whose timestamp failed
/// coercion; such rows still compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub vin: Vin,
    pub timestamp: Option<i64>,
}

impl IdentityKey {
    pub fn new(vin: Vin, timestamp: Option<i64>) -> Self {
        IdentityKey { vin, timestamp }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "({}, {})", self.vin, ts),
            None => write!(f, "({}, null)", self.vin),
        }
    }
}

/// Run ID for tracking one pipeline invocation.
///
/// Format: `run-<date>-<time>-<random>`
/// Example: `run-20260115-143022-abc123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .to_string()
            .chars()
            .take(6)
            .collect();
        RunId(format!("run-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
