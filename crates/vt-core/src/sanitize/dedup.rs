//! Identity-key collision resolution.

use super::stage::{Stage, StageOutput, StageReport};
use crate::columns::{nulls_last, required, text, timestamp_millis};
use arrow::array::{Array, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use tracing::{debug, info};
use vt_common::schema::{TIMESTAMP, TS_UTC, VIN};
use vt_common::{IdentityKey, Result, Vin};

/// Keep one row per (`vin`, `timestamp`) identity key.
///
/// Rows are stably sorted by `vin`, `ts_utc`, `timestamp` (ascending, nulls
/// last); among rows sharing an identity key the last one in that order
/// survives. The output keeps the sorted order, so the result is a pure
/// function of the input's content and relative row order.
pub fn resolve_collisions(batch: &RecordBatch) -> Result<StageOutput> {
    let stage = Stage::Collisions;
    let vins = text(required(batch, VIN, stage.name())?.as_ref())?;
    let timestamps = timestamp_millis(required(batch, TIMESTAMP, stage.name())?.as_ref())?;
    let ts_utc = match batch.column_by_name(TS_UTC) {
        Some(column) => timestamp_millis(column.as_ref())?,
        None => {
            debug!(%stage, "no ts_utc column, ordering by timestamp");
            timestamps.clone()
        }
    };

    let vin_at = |row: usize| vins.is_valid(row).then(|| vins.value(row));
    let mut order: Vec<usize> = (0..batch.num_rows()).collect();
    order.sort_by(|&a, &b| {
        nulls_last(&vin_at(a), &vin_at(b))
            .then_with(|| nulls_last(&ts_utc[a], &ts_utc[b]))
            .then_with(|| nulls_last(&timestamps[a], &timestamps[b]))
    });

    let mut last_seen: HashMap<IdentityKey, usize> = HashMap::with_capacity(order.len());
    for (position, &row) in order.iter().enumerate() {
        let vin = Vin(vin_at(row).unwrap_or_default().to_string());
        last_seen.insert(IdentityKey::new(vin, timestamps[row]), position);
    }
    let mut keep: Vec<bool> = vec![false; order.len()];
    for &position in last_seen.values() {
        keep[position] = true;
    }
    let indices: UInt32Array = order
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(&row, _)| row as u32)
        .collect();

    let batch = take_record_batch(batch, &indices)?;
    let report = StageReport::new(stage, order.len(), batch.num_rows());
    info!(
        %stage,
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        duplicates = report.rows_dropped(),
        "identity-key collisions resolved"
    );
    Ok(StageOutput { batch, report })
}
