//! Column names and Arrow types shared by every tier.

use arrow::datatypes::{DataType, TimeUnit};

/// Schema version written into Parquet key-value metadata.
pub const SCHEMA_VERSION: &str = "1.0.0";

pub const VIN: &str = "vin";
pub const TIMESTAMP: &str = "timestamp";
pub const TS_UTC: &str = "ts_utc";
pub const MANUFACTURER: &str = "manufacturer";
pub const GEAR_POSITION: &str = "gearPosition";
pub const VELOCITY: &str = "velocity";
pub const FRONT_LEFT_DOOR_STATE: &str = "frontLeftDoorState";
pub const WIPERS_STATE: &str = "wipersState";

/// Partition key: calendar day (UTC), `YYYY-MM-DD`.
pub const DATE: &str = "date";
/// Partition key: hour of day (UTC), 0-23.
pub const HOUR: &str = "hour";

/// Partition columns in directory nesting order.
pub const PARTITION_COLUMNS: [&str; 2] = [DATE, HOUR];

/// Fields that are categorical text regardless of how upstream encodes them.
pub const TEXT_FIELDS: [&str; 5] = [
    VIN,
    MANUFACTURER,
    GEAR_POSITION,
    FRONT_LEFT_DOOR_STATE,
    WIPERS_STATE,
];

/// Numeric fields stored as Float64 whenever upstream sends numbers, so
/// integer-only and fractional batches land with the same type.
pub const FLOAT_FIELDS: [&str; 1] = [VELOCITY];

/// Arrow type of `ts_utc`.
pub fn ts_utc_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
}

/// Arrow type of the `date` partition column.
pub fn date_type() -> DataType {
    DataType::Utf8
}

/// Arrow type of the `hour` partition column.
pub fn hour_type() -> DataType {
    DataType::Int16
}

/// Check if a schema version is compatible with current.
pub fn is_compatible(version: &str) -> bool {
    let major = |v: &str| v.split('.').next().and_then(|s| s.parse::<u32>().ok());
    major(SCHEMA_VERSION).is_some() && major(SCHEMA_VERSION) == major(version)
}
