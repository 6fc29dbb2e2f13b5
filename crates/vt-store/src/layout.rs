//! Hive path layout and partitioning helpers.
//!
//! A partitioned dataset lives at `<root>/<dataset>/date=<YYYY-MM-DD>/hour=<H>/`.
//! Files under a partition never contain the partition columns; they are
//! reconstructed from the directory names on read.

use arrow::array::{
    new_null_array, Array, ArrayRef, AsArray, Int16Array, StringArray, UInt32Array,
};
use arrow::compute::{can_cast_types, cast, concat_batches, take_record_batch};
use arrow::datatypes::{DataType, Field, Int64Type, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vt_common::schema::{self, DATE, HOUR, PARTITION_COLUMNS};
use vt_common::{Error, PartitionKey, Result};

/// Directory of one partition.
pub fn partition_dir(dataset_dir: &Path, key: &PartitionKey) -> PathBuf {
    dataset_dir
        .join(format!("{}={}", DATE, key.date_string()))
        .join(format!("{}={}", HOUR, key.hour))
}

/// Parse a `name=value` directory component for the expected `name`.
pub fn parse_component<'a>(component: &'a str, name: &str) -> Option<&'a str> {
    component
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('='))
}

/// Parse the `date=..` and `hour=..` directory names of one partition.
pub fn parse_partition(date_component: &str, hour_component: &str) -> Option<PartitionKey> {
    let date = parse_component(date_component, DATE)?;
    let hour = parse_component(hour_component, HOUR)?.parse::<i64>().ok()?;
    PartitionKey::parse(date, hour)
}

/// Partition columns absent from `batch`, in nesting order.
pub fn missing_partition_columns(batch: &RecordBatch) -> Vec<String> {
    PARTITION_COLUMNS
        .iter()
        .filter(|name| batch.column_by_name(name).is_none())
        .map(|name| name.to_string())
        .collect()
}

/// Per-row partition keys of `batch`.
///
/// Fails on missing partition columns, null values, unparsable dates, or
/// hours outside 0-23. Nothing is written by callers until this succeeds.
pub fn partition_keys(batch: &RecordBatch) -> Result<Vec<PartitionKey>> {
    let missing = missing_partition_columns(batch);
    if !missing.is_empty() {
        return Err(Error::MissingPartitionColumns(missing));
    }
    let dates = column_as(batch, DATE, &DataType::Utf8)?;
    let dates = dates.as_string::<i32>();
    let hours = column_as(batch, HOUR, &DataType::Int64)?;
    let hours = hours.as_primitive::<Int64Type>();

    let mut keys = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if dates.is_null(row) {
            return Err(invalid(DATE, format!("null at row {row}")));
        }
        if hours.is_null(row) {
            return Err(invalid(HOUR, format!("null at row {row}")));
        }
        let (date, hour) = (dates.value(row), hours.value(row));
        let key = PartitionKey::parse(date, hour).ok_or_else(|| {
            invalid(
                if (0..=23).contains(&hour) { DATE } else { HOUR },
                format!("date={date:?} hour={hour} at row {row}"),
            )
        })?;
        keys.push(key);
    }
    Ok(keys)
}

fn invalid(column: &str, detail: String) -> Error {
    Error::InvalidPartition {
        column: column.to_string(),
        detail,
    }
}

fn column_as(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::MissingPartitionColumns(vec![name.to_string()]))?;
    Ok(cast(column.as_ref(), to)?)
}

/// Remove the partition columns from `batch`.
pub fn strip_partition_columns(batch: &RecordBatch) -> Result<RecordBatch> {
    let keep: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !PARTITION_COLUMNS.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    Ok(batch.project(&keep)?)
}

/// Split `batch` into per-partition payloads (partition columns removed),
/// in order of first appearance. Row order inside a partition is preserved.
pub fn split_by_partition(batch: &RecordBatch) -> Result<Vec<(PartitionKey, RecordBatch)>> {
    let keys = partition_keys(batch)?;
    let payload = strip_partition_columns(batch)?;

    let mut order: Vec<(PartitionKey, Vec<u32>)> = Vec::new();
    let mut slot: HashMap<PartitionKey, usize> = HashMap::new();
    for (row, key) in keys.into_iter().enumerate() {
        let idx = *slot.entry(key.clone()).or_insert_with(|| {
            order.push((key, Vec::new()));
            order.len() - 1
        });
        order[idx].1.push(row as u32);
    }

    order
        .into_iter()
        .map(|(key, rows)| {
            let part = take_record_batch(&payload, &UInt32Array::from(rows))?;
            Ok((key, part))
        })
        .collect()
}

/// Re-attach `date` and `hour` columns to a partition payload.
pub fn with_partition_columns(payload: &RecordBatch, key: &PartitionKey) -> Result<RecordBatch> {
    let rows = payload.num_rows();
    let mut fields: Vec<Field> = payload
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let mut columns: Vec<ArrayRef> = payload.columns().to_vec();

    fields.push(Field::new(DATE, schema::date_type(), false));
    columns.push(Arc::new(StringArray::from(vec![key.date_string(); rows])));
    fields.push(Field::new(HOUR, schema::hour_type(), false));
    columns.push(Arc::new(Int16Array::from(vec![i16::from(key.hour); rows])));

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Concatenate partition payloads into one batch with partition columns.
///
/// Payloads written by different runs may disagree on columns; they are
/// conformed to [`merge_schemas`] before concatenation.
pub fn assemble(dataset: &str, parts: &[(PartitionKey, RecordBatch)]) -> Result<RecordBatch> {
    let schemas: Vec<SchemaRef> = parts.iter().map(|(_, payload)| payload.schema()).collect();
    let merged = Arc::new(merge_schemas(&schemas));

    let mut batches = Vec::with_capacity(parts.len());
    for (key, payload) in parts {
        let payload = conform(payload, &merged).map_err(|detail| {
            Error::SchemaMismatch(format!(
                "{dataset}/{key} has fields [{}], cannot read as [{}]: {detail}",
                field_list(&payload.schema()),
                field_list(&merged)
            ))
        })?;
        batches.push(with_partition_columns(&payload, key)?);
    }
    let Some(first) = batches.first() else {
        return Err(Error::DatasetNotFound(format!("{dataset} (no data files)")));
    };
    Ok(concat_batches(&first.schema(), &batches)?)
}

/// Union of payload schemas, columns in order of first appearance.
///
/// A column whose type differs between payloads widens to Float64 when
/// both types are numeric and to Utf8 otherwise. Columns missing from any
/// payload are nullable. Schema metadata is dropped.
pub fn merge_schemas(schemas: &[SchemaRef]) -> Schema {
    let mut fields: Vec<Field> = Vec::new();
    for schema in schemas {
        for field in schema.fields() {
            match fields.iter_mut().find(|f| f.name() == field.name()) {
                Some(merged) if merged.data_type() == field.data_type() => {
                    let nullable = merged.is_nullable() || field.is_nullable();
                    *merged = merged.clone().with_nullable(nullable);
                }
                Some(merged) => {
                    let widened = common_type(merged.data_type(), field.data_type());
                    *merged = merged.clone().with_data_type(widened).with_nullable(true);
                }
                None => fields.push(field.as_ref().clone()),
            }
        }
    }
    let fields: Vec<Field> = fields
        .into_iter()
        .map(|field| {
            let partial = schemas.iter().any(|s| s.field_with_name(field.name()).is_err());
            let nullable = field.is_nullable() || partial;
            field.with_nullable(nullable)
        })
        .collect();
    Schema::new(fields)
}

fn common_type(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (a, b) if a.is_numeric() && b.is_numeric() => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// Cast `payload` to `schema`, null-filling absent columns.
fn conform(payload: &RecordBatch, schema: &SchemaRef) -> std::result::Result<RecordBatch, String> {
    if payload.schema().fields() == schema.fields() {
        return Ok(payload.clone());
    }
    let rows = payload.num_rows();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let column = match payload.column_by_name(field.name()) {
            None => new_null_array(field.data_type(), rows),
            Some(column) if column.data_type() == field.data_type() => column.clone(),
            Some(column) => {
                if !can_cast_types(column.data_type(), field.data_type()) {
                    return Err(format!(
                        "{} cannot widen from {} to {}",
                        field.name(),
                        column.data_type(),
                        field.data_type()
                    ));
                }
                cast(column.as_ref(), field.data_type()).map_err(|e| e.to_string())?
            }
        };
        columns.push(column);
    }
    RecordBatch::try_new_with_options(
        schema.clone(),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(rows)),
    )
    .map_err(|e| e.to_string())
}

fn field_list(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}
