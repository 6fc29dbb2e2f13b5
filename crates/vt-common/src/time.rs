//! UTC time helpers and partition-key derivation.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds in one hour.
pub const HOUR_MILLIS: i64 = 3_600_000;

/// Convert epoch milliseconds to a UTC datetime.
///
/// Returns `None` outside chrono's representable range.
pub fn utc_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Floor epoch milliseconds to the start of their UTC hour.
pub fn floor_to_hour(millis: i64) -> i64 {
    millis.div_euclid(HOUR_MILLIS) * HOUR_MILLIS
}

/// Format epoch milliseconds as `YYYY-MM-DD HH:MM:SS+00:00`.
pub fn format_utc(millis: i64) -> Option<String> {
    utc_from_millis(millis).map(|dt| dt.format("%Y-%m-%d %H:%M:%S+00:00").to_string())
}

/// The (date, hour) storage partition of one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub date: NaiveDate,
    pub hour: u8,
}

impl PartitionKey {
    /// Derive the partition key from an epoch-millisecond timestamp.
    pub fn from_millis(millis: i64) -> Option<Self> {
        let dt = utc_from_millis(millis)?;
        Some(PartitionKey {
            date: dt.date_naive(),
            hour: dt.hour() as u8,
        })
    }

    /// Parse the textual forms stored in the `date` and `hour` columns.
    pub fn parse(date: &str, hour: i64) -> Option<Self> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        if !(0..=23).contains(&hour) {
            return None;
        }
        Some(PartitionKey {
            date,
            hour: hour as u8,
        })
    }

    /// `YYYY-MM-DD` rendering used for the `date` column.
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "date={}/hour={}", self.date_string(), self.hour)
    }
}
