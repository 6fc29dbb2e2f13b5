//! Partition-key validation ahead of the silver write.

use crate::columns::{required, timestamp_millis};
use arrow::record_batch::RecordBatch;
use vt_common::schema::{TIMESTAMP, TS_UTC};
use vt_common::{Error, PartitionKey, Result};
use vt_store::layout::partition_keys;

use super::stage::Stage;

/// Check that every row carries a valid (`date`, `hour`) pair that agrees
/// with its UTC timestamp, returning the distinct keys in first-appearance
/// order.
///
/// `ts_utc` is the reference when present, otherwise `timestamp`. Any
/// failure aborts before anything is written.
pub fn validate_partitions(batch: &RecordBatch) -> Result<Vec<PartitionKey>> {
    let keys = partition_keys(batch)?;
    let reference = match batch.column_by_name(TS_UTC) {
        Some(column) => column,
        None => required(batch, TIMESTAMP, Stage::PartitionWrite.name())?,
    };
    let millis = timestamp_millis(reference.as_ref())?;

    let mut distinct: Vec<PartitionKey> = Vec::new();
    for (row, (key, ts)) in keys.into_iter().zip(millis).enumerate() {
        let Some(ts) = ts else {
            return Err(Error::PartitionMismatch {
                row,
                detail: format!("{key} has no timestamp to derive it from"),
            });
        };
        let expected = PartitionKey::from_millis(ts).ok_or_else(|| Error::PartitionMismatch {
            row,
            detail: format!("timestamp {ts} is outside the representable range"),
        })?;
        if expected != key {
            return Err(Error::PartitionMismatch {
                row,
                detail: format!("stored {key}, timestamp {ts} belongs to {expected}"),
            });
        }
        if !distinct.contains(&key) {
            distinct.push(key);
        }
    }
    Ok(distinct)
}
