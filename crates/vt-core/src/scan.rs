//! SQL-injection scanner and the probe-row simulator used to exercise it.

use crate::columns::text;
use crate::report::write_csv;
use arrow::array::{Array, ArrayRef, StringArray, UInt32Array};
use arrow::compute::{concat_batches, take_record_batch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use vt_common::{Error, Result};

/// One suspicious value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub column: String,
    pub value: String,
    pub pattern: String,
}

/// Case-insensitive pattern matcher over text columns.
#[derive(Debug, Clone)]
pub struct InjectionScanner {
    patterns: Vec<Regex>,
}

impl InjectionScanner {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::InvalidPattern(format!("{p}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Every (column, value, pattern) match in `columns`, grouped by column
    /// then pattern, in row order. Null values never match.
    pub fn scan(&self, batch: &RecordBatch, columns: &[String]) -> Result<Vec<Violation>> {
        let mut violations = Vec::new();
        for column in columns {
            let array = batch
                .column_by_name(column)
                .ok_or_else(|| Error::MissingColumns {
                    stage: "scan".to_string(),
                    columns: vec![column.clone()],
                })?;
            let values = text(array.as_ref())?;
            for pattern in &self.patterns {
                for value in values.iter().flatten() {
                    if pattern.is_match(value) {
                        violations.push(Violation {
                            column: column.clone(),
                            value: value.to_string(),
                            pattern: pattern.as_str().to_string(),
                        });
                    }
                }
            }
        }
        info!(
            columns = columns.len(),
            patterns = self.patterns.len(),
            rows = batch.num_rows(),
            violations = violations.len(),
            "injection scan finished"
        );
        Ok(violations)
    }
}

/// Write violations as CSV `column,value,pattern`. Returns whether a file
/// was written; an empty list writes nothing.
pub fn write_violation_report(path: &Path, violations: &[Violation]) -> Result<bool> {
    if violations.is_empty() {
        info!("no injection violations found, no report written");
        return Ok(false);
    }
    let schema = Schema::new(vec![
        Field::new("column", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("pattern", DataType::Utf8, false),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(violations.iter().map(|v| v.column.as_str()))),
        Arc::new(StringArray::from_iter_values(violations.iter().map(|v| v.value.as_str()))),
        Arc::new(StringArray::from_iter_values(violations.iter().map(|v| v.pattern.as_str()))),
    ];
    write_csv(path, &RecordBatch::try_new(Arc::new(schema), columns)?)?;
    warn!(
        path = %path.display(),
        violations = violations.len(),
        "injection violations reported"
    );
    Ok(true)
}

/// Append a copy of the first row with `column` replaced by `payload`.
pub fn inject_probe_row(batch: &RecordBatch, column: &str, payload: &str) -> Result<RecordBatch> {
    if batch.num_rows() == 0 {
        return Err(Error::Injection("dataset has no rows to copy".to_string()));
    }
    let index = batch
        .schema()
        .index_of(column)
        .map_err(|_| Error::Injection(format!("no column named {column:?}")))?;
    if batch.column(index).data_type() != &DataType::Utf8 {
        return Err(Error::Injection(format!(
            "column {column:?} is {}, expected Utf8",
            batch.column(index).data_type()
        )));
    }

    let first = take_record_batch(batch, &UInt32Array::from(vec![0u32]))?;
    let mut columns = first.columns().to_vec();
    columns[index] = Arc::new(StringArray::from(vec![payload]));
    let probe = RecordBatch::try_new(batch.schema(), columns)?;
    let injected = concat_batches(&batch.schema(), [batch, &probe])?;
    info!(column, rows = injected.num_rows(), "probe row injected");
    Ok(injected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Int64Array};
    use vt_config::DEFAULT_INJECTION_PATTERN;

    fn vins(values: Vec<Option<&str>>) -> RecordBatch {
        let n = values.len() as i64;
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("vin", DataType::Utf8, true),
                Field::new("timestamp", DataType::Int64, false),
            ])),
            vec![
                Arc::new(StringArray::from(values)),
                Arc::new(Int64Array::from_iter_values(0..n)),
            ],
        )
        .unwrap()
    }

    fn scanner() -> InjectionScanner {
        InjectionScanner::new(&[DEFAULT_INJECTION_PATTERN.to_string()]).unwrap()
    }

    #[test]
    fn default_pattern_flags_sql_fragments() {
        let batch = vins(vec![
            Some("1HGCM82633A004352"),
            Some("DROP TABLE users;"),
            Some("x' OR '1'='1"),
            Some("select"),
            Some("DROPPED"),
            None,
        ]);
        let found = scanner().scan(&batch, &["vin".to_string()]).unwrap();
        let values: Vec<_> = found.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(values, vec!["DROP TABLE users;", "x' OR '1'='1", "select"]);
        assert!(found.iter().all(|v| v.column == "vin"));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let err = scanner().scan(&vins(vec![Some("A")]), &["plate".to_string()]);
        assert!(matches!(err, Err(Error::MissingColumns { .. })));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        assert!(matches!(
            InjectionScanner::new(&["(".to_string()]),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[test]
    fn probe_row_copies_first_row() {
        let batch = vins(vec![Some("A"), Some("B")]);
        let injected = inject_probe_row(&batch, "vin", "DROP TABLE users;").unwrap();
        assert_eq!(injected.num_rows(), 3);
        let vin = injected.column(0).as_string::<i32>();
        assert_eq!(vin.value(2), "DROP TABLE users;");
        let ts = injected.column(1).as_primitive::<arrow::datatypes::Int64Type>();
        assert_eq!(ts.value(2), 0);

        let found = scanner().scan(&injected, &["vin".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn probe_requires_rows_and_text_column() {
        let empty = vins(vec![]);
        assert!(matches!(
            inject_probe_row(&empty, "vin", "x"),
            Err(Error::Injection(_))
        ));
        let batch = vins(vec![Some("A")]);
        assert!(matches!(
            inject_probe_row(&batch, "timestamp", "x"),
            Err(Error::Injection(_))
        ));
    }

    #[test]
    fn empty_violations_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.csv");
        assert!(!write_violation_report(&path, &[]).unwrap());
        assert!(!path.exists());
    }
}
