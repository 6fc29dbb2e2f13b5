//! Top-speed report: the fastest vehicles of every UTC hour.

use crate::columns::{numeric_values, required, text, timestamp_millis};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use vt_common::schema::{TS_UTC, VELOCITY, VIN};
use vt_common::time::{floor_to_hour, format_utc};
use vt_common::{Error, Result};
use vt_store::DatasetStore;

const STAGE: &str = "report";

/// Highest velocity of one vehicle within one hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopSpeed {
    /// Start of the hour, epoch milliseconds.
    pub date_hour: i64,
    pub vin: String,
    pub top_velocity: f64,
}

/// Per-hour ranking of vehicles by their peak velocity.
///
/// Rows with a null VIN, a null `ts_utc` or a non-numeric velocity are
/// ignored. The result is ordered by hour ascending, then velocity
/// descending (VIN ascending on ties), with at most `top_n` rows per hour.
pub fn top_speeds(silver: &RecordBatch, top_n: usize) -> Result<Vec<TopSpeed>> {
    let vins = text(required(silver, VIN, STAGE)?.as_ref())?;
    let ts = timestamp_millis(required(silver, TS_UTC, STAGE)?.as_ref())?;
    let velocity = numeric_values(required(silver, VELOCITY, STAGE)?.as_ref())?;

    let mut peaks: HashMap<(i64, &str), f64> = HashMap::new();
    for (row, vin) in vins.iter().enumerate() {
        let (Some(vin), Some(millis), Ok(v)) = (vin, ts[row], &velocity[row]) else {
            continue;
        };
        peaks
            .entry((floor_to_hour(millis), vin))
            .and_modify(|peak| *peak = peak.max(*v))
            .or_insert(*v);
    }

    let mut ranked: Vec<TopSpeed> = peaks
        .into_iter()
        .map(|((date_hour, vin), top_velocity)| TopSpeed {
            date_hour,
            vin: vin.to_string(),
            top_velocity,
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.date_hour
            .cmp(&b.date_hour)
            .then_with(|| b.top_velocity.total_cmp(&a.top_velocity))
            .then_with(|| a.vin.cmp(&b.vin))
    });

    let mut per_hour: HashMap<i64, usize> = HashMap::new();
    ranked.retain(|speed| {
        let seen = per_hour.entry(speed.date_hour).or_insert(0);
        *seen += 1;
        *seen <= top_n
    });
    Ok(ranked)
}

/// Render the ranking as a batch with columns `date_hour`, `vin`,
/// `top_velocity`. Hours are formatted `YYYY-MM-DD HH:MM:SS+00:00`.
pub fn top_speeds_batch(speeds: &[TopSpeed]) -> Result<RecordBatch> {
    let hours = speeds
        .iter()
        .map(|s| {
            format_utc(s.date_hour)
                .ok_or_else(|| Error::SchemaMismatch(format!("hour {} out of range", s.date_hour)))
        })
        .collect::<Result<Vec<_>>>()?;
    let schema = Schema::new(vec![
        Field::new("date_hour", DataType::Utf8, false),
        Field::new(VIN, DataType::Utf8, false),
        Field::new("top_velocity", DataType::Float64, false),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(hours)),
        Arc::new(StringArray::from_iter_values(speeds.iter().map(|s| s.vin.as_str()))),
        Arc::new(Float64Array::from_iter_values(speeds.iter().map(|s| s.top_velocity))),
    ];
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

/// Write `batch` to `path` as CSV with a header row, creating parent
/// directories as needed.
pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new().with_header(true).build(File::create(path)?);
    writer.write(batch)?;
    Ok(())
}

/// Outcome of a report build.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub hours: usize,
}

/// Build the top-speed report from the whole silver dataset.
pub fn build_top_speed_report(
    store: &dyn DatasetStore,
    silver: &str,
    path: &Path,
    top_n: usize,
) -> Result<ReportSummary> {
    let batch = store.read_all(silver)?;
    let speeds = top_speeds(&batch, top_n)?;
    write_csv(path, &top_speeds_batch(&speeds)?)?;

    let mut hours: Vec<i64> = speeds.iter().map(|s| s.date_hour).collect();
    hours.dedup();
    info!(
        path = %path.display(),
        rows = speeds.len(),
        hours = hours.len(),
        top_n,
        "top-speed report written"
    );
    Ok(ReportSummary {
        path: path.to_path_buf(),
        rows: speeds.len(),
        hours: hours.len(),
    })
}
