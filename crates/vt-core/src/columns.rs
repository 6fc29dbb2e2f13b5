//! Column access and explicit value coercion.
//!
//! Every coercion returns a typed `Result` per row. Callers decide what a
//! failed coercion means for their stage (drop, skip, keep); nothing here
//! substitutes a default.

use arrow::array::{Array, ArrayRef, AsArray, StringArray};
use arrow::compute::{can_cast_types, cast};
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, TimeUnit, TimestampMillisecondType,
};
use arrow::record_batch::RecordBatch;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use vt_common::{Error, Result};

/// Why a single value could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("value is null")]
    Null,
    #[error("not numeric: {0:?}")]
    NotNumeric(String),
    #[error("not an integer: {0:?}")]
    NotIntegral(String),
    #[error("out of range: {0:?}")]
    OutOfRange(String),
}

/// Look up a column that the current stage cannot run without.
pub fn required<'a>(batch: &'a RecordBatch, name: &str, stage: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| Error::MissingColumns {
        stage: stage.to_string(),
        columns: vec![name.to_string()],
    })
}

/// Coerce a column to UTF-8 text.
pub fn text(array: &dyn Array) -> Result<StringArray> {
    let utf8 = cast(array, &DataType::Utf8)?;
    Ok(utf8.as_string::<i32>().clone())
}

fn is_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    )
}

/// Parse a textual number. Surrounding whitespace is ignored; NaN is not a
/// number.
pub fn parse_number(raw: &str) -> std::result::Result<f64, CoercionError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if !v.is_nan() => Ok(v),
        _ => Err(CoercionError::NotNumeric(raw.to_string())),
    }
}

/// Per-row numeric coercion of any column.
///
/// Numeric and boolean columns are cast; text columns are parsed row by
/// row; any other type yields `NotNumeric` for every non-null row.
pub fn numeric_values(array: &dyn Array) -> Result<Vec<std::result::Result<f64, CoercionError>>> {
    let data_type = array.data_type();
    if !is_text(data_type) && can_cast_types(data_type, &DataType::Float64) {
        let floats = cast(array, &DataType::Float64)?;
        let floats = floats.as_primitive::<Float64Type>();
        return Ok(floats
            .iter()
            .map(|v| match v {
                None => Err(CoercionError::Null),
                Some(v) if v.is_nan() => Err(CoercionError::NotNumeric("NaN".to_string())),
                Some(v) => Ok(v),
            })
            .collect());
    }
    if !can_cast_types(data_type, &DataType::Utf8) {
        let label = data_type.to_string();
        return Ok((0..array.len())
            .map(|row| {
                if array.is_null(row) {
                    Err(CoercionError::Null)
                } else {
                    Err(CoercionError::NotNumeric(label.clone()))
                }
            })
            .collect());
    }
    Ok(text(array)?
        .iter()
        .map(|v| v.map_or(Err(CoercionError::Null), parse_number))
        .collect())
}

/// Per-row integer coercion (epoch milliseconds and similar).
///
/// Integer columns are read exactly; other columns go through
/// [`numeric_values`] and must hold integral values.
pub fn integer_values(array: &dyn Array) -> Result<Vec<std::result::Result<i64, CoercionError>>> {
    if array.data_type().is_integer() {
        let ints = cast(array, &DataType::Int64)?;
        return Ok(ints
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.ok_or(CoercionError::Null))
            .collect());
    }
    Ok(numeric_values(array)?
        .into_iter()
        .map(|v| v.and_then(integral_i64))
        .collect())
}

fn integral_i64(v: f64) -> std::result::Result<i64, CoercionError> {
    if v.fract() != 0.0 {
        return Err(CoercionError::NotIntegral(v.to_string()));
    }
    if v < i64::MIN as f64 || v >= i64::MAX as f64 {
        return Err(CoercionError::OutOfRange(v.to_string()));
    }
    Ok(v as i64)
}

/// Parse a gear position token into the signed small-integer domain.
///
/// Accepts integer text (`"3"`, `"-1"`) and integral float text (`"2.0"`).
/// Aliases must already have been substituted by the caller.
pub fn parse_gear(raw: &str) -> std::result::Result<i16, CoercionError> {
    let trimmed = raw.trim();
    let value = match trimmed.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            let f = parse_number(trimmed)?;
            if !f.is_finite() || f.fract() != 0.0 {
                return Err(CoercionError::NotIntegral(raw.to_string()));
            }
            if f < i64::MIN as f64 || f >= i64::MAX as f64 {
                return Err(CoercionError::OutOfRange(raw.to_string()));
            }
            f as i64
        }
    };
    i16::try_from(value).map_err(|_| CoercionError::OutOfRange(raw.to_string()))
}

/// Epoch milliseconds of a timestamp column (any unit or zone), or of an
/// integer column holding epoch milliseconds.
///
/// Only the unit changes; the zone is kept so naive columns never need a
/// timezone lookup.
pub fn timestamp_millis(array: &dyn Array) -> Result<Vec<Option<i64>>> {
    match array.data_type() {
        DataType::Timestamp(_, tz) => {
            let ms = cast(array, &DataType::Timestamp(TimeUnit::Millisecond, tz.clone()))?;
            Ok(ms.as_primitive::<TimestampMillisecondType>().iter().collect())
        }
        _ => Ok(integer_values(array)?.into_iter().map(|v| v.ok()).collect()),
    }
}

/// Ascending order with nulls after every value.
pub fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Replace (by name) a column with `array`, keeping the field's nullability
/// and adopting the new array's type.
pub fn replace_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let index = schema.index_of(name)?;
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| {
            if i == index {
                f.as_ref().clone().with_data_type(array.data_type().clone())
            } else {
                f.as_ref().clone()
            }
        })
        .collect();
    let mut columns = batch.columns().to_vec();
    columns[index] = array;
    Ok(RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )?)
}
