//! Value-rewriting stages: manufacturer whitespace and gear position.

use super::stage::{tally, Stage, StageOutput, StageReport};
use crate::columns::{parse_gear, replace_column, text, CoercionError};
use arrow::array::{Array, BooleanArray, Int16Array, StringArray};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{debug, info};
use vt_common::schema::{GEAR_POSITION, MANUFACTURER};
use vt_common::Result;

/// Gear aliases and their canonical values. Matching is exact and
/// case-sensitive.
pub const GEAR_ALIASES: [(&str, i16); 2] = [("NEUTRAL", 0), ("REVERSE", -1)];

/// Label used in reports for null values.
pub const NULL_LABEL: &str = "<null>";

/// Strip leading/trailing whitespace from `manufacturer`. Nulls are left
/// alone and no row is ever dropped.
pub fn trim_manufacturer(batch: &RecordBatch) -> Result<StageOutput> {
    let stage = Stage::ManufacturerWhitespace;
    let Some(column) = batch.column_by_name(MANUFACTURER) else {
        debug!(%stage, "no manufacturer column, skipping");
        return Ok(StageOutput::skipped(stage, batch));
    };

    let raw = text(column.as_ref())?;
    let mut report = StageReport::new(stage, batch.num_rows(), batch.num_rows());
    let trimmed: StringArray = raw
        .iter()
        .map(|value| {
            value.map(|v| {
                let t = v.trim();
                if t.len() != v.len() {
                    report.rows_changed += 1;
                    tally(&mut report.changed_values, v);
                }
                t
            })
        })
        .collect();

    if report.rows_changed > 0 {
        info!(
            %stage,
            rows_changed = report.rows_changed,
            values = ?report.changed_values.keys().collect::<Vec<_>>(),
            "manufacturer whitespace fixed"
        );
    }
    let batch = replace_column(batch, MANUFACTURER, Arc::new(trimmed))?;
    Ok(StageOutput { batch, report })
}

/// Map gear aliases to integers, coerce everything else, and drop rows
/// whose value is not a signed small integer.
///
/// Unknown tokens are dropped rather than defaulted: conflating an
/// unrecognised state with neutral would corrupt the data.
pub fn normalize_gear_position(batch: &RecordBatch) -> Result<StageOutput> {
    let stage = Stage::GearPosition;
    let Some(column) = batch.column_by_name(GEAR_POSITION) else {
        debug!(%stage, "no gearPosition column, skipping");
        return Ok(StageOutput::skipped(stage, batch));
    };

    let raw = text(column.as_ref())?;
    let mut report = StageReport::new(stage, batch.num_rows(), 0);
    let mut keep = Vec::with_capacity(raw.len());
    let mut gears = Vec::with_capacity(raw.len());

    for value in raw.iter() {
        match coerce_gear(value) {
            Ok((gear, alias)) => {
                if let Some(alias) = alias {
                    report.rows_changed += 1;
                    tally(&mut report.changed_values, alias);
                }
                keep.push(true);
                gears.push(gear);
            }
            Err(_) => {
                keep.push(false);
                tally(&mut report.dropped_values, value.unwrap_or(NULL_LABEL));
            }
        }
    }

    for (alias, gear) in GEAR_ALIASES {
        if let Some(count) = report.changed_values.get(alias) {
            info!(%stage, count, alias, gear, "replaced gear alias");
        }
    }

    let filtered = filter_record_batch(batch, &BooleanArray::from(keep))?;
    let batch = replace_column(&filtered, GEAR_POSITION, Arc::new(Int16Array::from(gears)))?;
    report.rows_out = batch.num_rows();

    if report.rows_dropped() > 0 {
        info!(
            %stage,
            dropped = report.rows_dropped(),
            values = ?report.dropped_values.keys().collect::<Vec<_>>(),
            "dropped rows with invalid gearPosition"
        );
    }
    Ok(StageOutput { batch, report })
}

/// Canonical gear value, plus the alias it was substituted from.
fn coerce_gear(
    value: Option<&str>,
) -> std::result::Result<(i16, Option<&'static str>), CoercionError> {
    let raw = value.ok_or(CoercionError::Null)?;
    if let Some(&(alias, gear)) = GEAR_ALIASES.iter().find(|(alias, _)| *alias == raw) {
        return Ok((gear, Some(alias)));
    }
    parse_gear(raw).map(|gear| (gear, None))
}
