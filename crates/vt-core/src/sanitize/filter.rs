//! Row-dropping stages: VIN validity and velocity outliers.

use super::stage::{tally, Stage, StageOutput, StageReport};
use crate::columns::{numeric_values, replace_column, required, text, CoercionError};
use arrow::array::{BooleanArray, Float64Array};
use arrow::compute::filter_record_batch;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{info, warn};
use vt_common::schema::{VELOCITY, VIN};
use vt_common::Result;

/// Drop rows whose `vin` is null or empty once coerced to text.
///
/// A missing `vin` column is fatal: no silver row can be identified
/// without it.
pub fn drop_invalid_vins(batch: &RecordBatch) -> Result<StageOutput> {
    let stage = Stage::VinFilter;
    let vins = text(required(batch, VIN, stage.name())?.as_ref())?;

    let mut report = StageReport::new(stage, batch.num_rows(), 0);
    let keep: BooleanArray = vins
        .iter()
        .map(|vin| {
            let valid = match vin {
                None => {
                    tally(&mut report.dropped_values, "null");
                    false
                }
                Some("") => {
                    tally(&mut report.dropped_values, "empty");
                    false
                }
                Some(_) => true,
            };
            Some(valid)
        })
        .collect();

    let batch = filter_record_batch(batch, &keep)?;
    report.rows_out = batch.num_rows();
    info!(
        %stage,
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        dropped = report.rows_dropped(),
        "dropped rows with null or empty vin"
    );
    Ok(StageOutput { batch, report })
}

/// Drop rows whose velocity lies outside `[min, max]`.
///
/// Values that cannot be coerced to a number fail the bounds test. The
/// surviving column is stored as Float64.
pub fn filter_velocity_outliers(batch: &RecordBatch, min: f64, max: f64) -> Result<StageOutput> {
    let stage = Stage::VelocityFilter;
    let Some(column) = batch.column_by_name(VELOCITY) else {
        warn!(%stage, "no velocity column, outlier filter skipped");
        return Ok(StageOutput::skipped(stage, batch));
    };

    let mut report = StageReport::new(stage, batch.num_rows(), 0);
    let mut keep = Vec::with_capacity(batch.num_rows());
    let mut survivors = Vec::with_capacity(batch.num_rows());
    for value in numeric_values(column.as_ref())? {
        match value {
            Ok(v) if v < min => tally(&mut report.dropped_values, "below_min"),
            Ok(v) if v > max => tally(&mut report.dropped_values, "above_max"),
            Ok(v) => {
                keep.push(true);
                survivors.push(v);
                continue;
            }
            Err(CoercionError::Null) => tally(&mut report.dropped_values, "null"),
            Err(_) => tally(&mut report.dropped_values, "non_numeric"),
        }
        keep.push(false);
    }

    let filtered = filter_record_batch(batch, &BooleanArray::from(keep))?;
    let batch = replace_column(&filtered, VELOCITY, Arc::new(Float64Array::from(survivors)))?;
    report.rows_out = batch.num_rows();
    info!(
        %stage,
        min,
        max,
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        dropped = report.rows_dropped(),
        "velocity outliers removed"
    );
    Ok(StageOutput { batch, report })
}

/// Store `velocity` as Float64 without dropping rows, for runs with the
/// outlier filter disabled.
///
/// Silver keeps one velocity type whatever the filter setting. Values that
/// are not numbers become null and are counted as changed.
pub fn coerce_velocity(batch: &RecordBatch) -> Result<StageOutput> {
    let stage = Stage::VelocityFilter;
    let column = match batch.column_by_name(VELOCITY) {
        Some(column) if column.data_type() != &DataType::Float64 => column,
        _ => return Ok(StageOutput::skipped(stage, batch)),
    };

    let mut report = StageReport::skipped(stage, batch.num_rows());
    let values: Float64Array = numeric_values(column.as_ref())?
        .into_iter()
        .map(|value| match value {
            Ok(v) => Some(v),
            Err(CoercionError::Null) => None,
            Err(CoercionError::NotNumeric(raw)) => {
                report.rows_changed += 1;
                tally(&mut report.changed_values, raw);
                None
            }
            Err(other) => {
                report.rows_changed += 1;
                tally(&mut report.changed_values, other.to_string());
                None
            }
        })
        .collect();
    if report.rows_changed > 0 {
        warn!(%stage, nulled = report.rows_changed, "non-numeric velocity values stored as null");
    }
    let batch = replace_column(batch, VELOCITY, Arc::new(values))?;
    Ok(StageOutput { batch, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, ArrayRef, AsArray, Int64Array, StringArray};
    use arrow::datatypes::{Field, Float64Type, Schema};
    use vt_common::Error;

    fn single(name: &str, array: ArrayRef) -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new(name, array.data_type().clone(), true)])),
            vec![array],
        )
        .unwrap()
    }

    #[test]
    fn null_and_empty_vins_are_dropped() {
        let batch = single(
            VIN,
            Arc::new(StringArray::from(vec![Some("A"), None, Some(""), Some(" ")])),
        );
        let out = drop_invalid_vins(&batch).unwrap();
        assert_eq!(out.batch.num_rows(), 2, "whitespace-only vin is not empty");
        assert_eq!(out.report.dropped_values.get("null"), Some(&1));
        assert_eq!(out.report.dropped_values.get("empty"), Some(&1));
    }

    #[test]
    fn numeric_vins_are_coerced_to_text() {
        let batch = single(VIN, Arc::new(Int64Array::from(vec![Some(7), None])));
        let out = drop_invalid_vins(&batch).unwrap();
        assert_eq!(out.report.rows_out, 1);
    }

    #[test]
    fn missing_vin_column_is_fatal() {
        let batch = single("other", Arc::new(StringArray::from(vec!["A"])));
        match drop_invalid_vins(&batch) {
            Err(Error::MissingColumns { stage, columns }) => {
                assert_eq!(stage, "vin_filter");
                assert_eq!(columns, vec!["vin"]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let batch = single(
            VELOCITY,
            Arc::new(Int64Array::from(vec![Some(301), Some(300), Some(-5), Some(0), None])),
        );
        let out = filter_velocity_outliers(&batch, 0.0, 300.0).unwrap();
        let velocity = out.batch.column(0).as_primitive::<Float64Type>();
        assert_eq!(velocity.values().to_vec(), vec![300.0, 0.0]);
        assert_eq!(out.batch.column(0).data_type(), &DataType::Float64);
        assert_eq!(out.report.dropped_values.get("above_max"), Some(&1));
        assert_eq!(out.report.dropped_values.get("below_min"), Some(&1));
        assert_eq!(out.report.dropped_values.get("null"), Some(&1));
    }

    #[test]
    fn non_numeric_velocity_fails_the_test() {
        let batch = single(
            VELOCITY,
            Arc::new(StringArray::from(vec!["120.5", "fast", "1e9"])),
        );
        let out = filter_velocity_outliers(&batch, 0.0, 300.0).unwrap();
        assert_eq!(out.batch.num_rows(), 1);
        assert_eq!(out.report.dropped_values.get("non_numeric"), Some(&1));
    }

    #[test]
    fn disabled_filter_still_stores_float_velocity() {
        let ints = single(VELOCITY, Arc::new(Int64Array::from(vec![Some(900), None])));
        let out = coerce_velocity(&ints).unwrap();
        assert!(out.report.skipped);
        assert_eq!(out.report.rows_out, 2);
        let velocity = out.batch.column(0).as_primitive::<Float64Type>();
        assert_eq!(velocity.value(0), 900.0);
        assert!(velocity.is_null(1));

        let text = single(VELOCITY, Arc::new(StringArray::from(vec!["12.5", "fast"])));
        let out = coerce_velocity(&text).unwrap();
        assert_eq!(out.batch.num_rows(), 2);
        assert_eq!(out.batch.column(0).data_type(), &DataType::Float64);
        assert_eq!(out.report.rows_changed, 1);
        assert_eq!(out.report.changed_values.get("fast"), Some(&1));
    }

    #[test]
    fn absent_velocity_is_skipped() {
        let batch = single(VIN, Arc::new(StringArray::from(vec!["A"])));
        let out = filter_velocity_outliers(&batch, 0.0, 300.0).unwrap();
        assert!(out.report.skipped);
        assert_eq!(out.batch.num_rows(), 1);
    }
}
