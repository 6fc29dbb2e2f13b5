//! Bronze ingestion: fetch upstream messages and append them, partitioned
//! by UTC date and hour.
//!
//! Records without a usable `timestamp` cannot be partitioned and are
//! dropped here, before anything reaches storage.

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int16Array, Int64Array, StringArray,
    TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vt_common::schema::{self, DATE, FLOAT_FIELDS, HOUR, TEXT_FIELDS, TIMESTAMP, TS_UTC};
use vt_common::{Error, PartitionKey, Result};
use vt_config::IngestConfig;
use vt_store::{DatasetStore, WriteMode};

/// Anything that can hand over a batch of raw upstream messages.
pub trait MessageSource {
    fn fetch(&self, amount: u32) -> Result<Vec<Value>>;
}

/// Upstream HTTP API returning a JSON array of flat message objects.
pub struct HttpSource {
    agent: ureq::Agent,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(&config.api_url, Duration::from_secs(config.timeout_secs))
    }
}

impl MessageSource for HttpSource {
    fn fetch(&self, amount: u32) -> Result<Vec<Value>> {
        debug!(url = %self.url, amount, "fetching upstream messages");
        let response = self
            .agent
            .get(&self.url)
            .query("amount", &amount.to_string())
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    Error::Fetch(format!("{} returned HTTP {code}", self.url))
                }
                other => Error::Fetch(format!("{}: {other}", self.url)),
            })?;
        let payload: Value = response
            .into_json()
            .map_err(|e| Error::Fetch(format!("{} sent a non-JSON body: {e}", self.url)))?;
        match payload {
            Value::Array(records) => Ok(records),
            other => Err(Error::InvalidPayload(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

/// Fixed in-memory messages, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<Value>,
}

impl StaticSource {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

impl MessageSource for StaticSource {
    fn fetch(&self, amount: u32) -> Result<Vec<Value>> {
        Ok(self.records.iter().take(amount as usize).cloned().collect())
    }
}

/// Fetch one batch of messages from the configured upstream API.
pub fn fetch_messages(config: &IngestConfig) -> Result<Vec<Value>> {
    let records = HttpSource::from_config(config).fetch(config.amount)?;
    info!(url = %config.api_url, received = records.len(), "upstream messages fetched");
    Ok(records)
}

/// Upstream records converted to a bronze batch.
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub batch: RecordBatch,
    pub rows_received: usize,
    /// Rows dropped for a missing or invalid `timestamp`.
    pub rows_dropped: usize,
}

/// Outcome of one bronze append.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub dataset: String,
    pub rows_received: usize,
    pub rows_dropped: usize,
    pub rows_written: usize,
    pub partitions: Vec<String>,
}

/// Columns derived here; same-named upstream fields are ignored.
const DERIVED: [&str; 3] = [TS_UTC, DATE, HOUR];

/// Epoch milliseconds of a raw `timestamp` value. Numbers and numeric
/// strings are accepted; fractional values are truncated.
fn coerce_timestamp(value: Option<&Value>) -> Option<i64> {
    let millis = match value? {
        Value::Number(n) => match n.as_i64() {
            Some(i) => return Some(i),
            None => n.as_f64()?,
        },
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => return Some(i),
            Err(_) => s.trim().parse::<f64>().ok()?,
        },
        _ => return None,
    };
    if !millis.is_finite() || millis < i64::MIN as f64 || millis >= i64::MAX as f64 {
        return None;
    }
    Some(millis.trunc() as i64)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build one column from the values of `name` across `rows`.
fn infer_column(name: &str, rows: &[&Map<String, Value>]) -> (DataType, ArrayRef) {
    let values: Vec<Option<&Value>> = rows
        .iter()
        .map(|row| row.get(name).filter(|v| !v.is_null()))
        .collect();
    let present = || values.iter().flatten();

    let any_present = present().next().is_some();
    if FLOAT_FIELDS.contains(&name) && present().all(|v| v.is_number()) {
        let array = Float64Array::from_iter(values.iter().map(|v| v.and_then(Value::as_f64)));
        return (DataType::Float64, Arc::new(array));
    }
    if any_present && !TEXT_FIELDS.contains(&name) {
        if present().all(|v| v.is_boolean()) {
            let array = BooleanArray::from_iter(values.iter().map(|v| v.and_then(Value::as_bool)));
            return (DataType::Boolean, Arc::new(array));
        }
        if present().all(|v| v.is_i64()) {
            let array = Int64Array::from_iter(values.iter().map(|v| v.and_then(Value::as_i64)));
            return (DataType::Int64, Arc::new(array));
        }
        if present().all(|v| v.is_number()) {
            let array = Float64Array::from_iter(values.iter().map(|v| v.and_then(Value::as_f64)));
            return (DataType::Float64, Arc::new(array));
        }
    }

    let array: StringArray = values
        .iter()
        .map(|v| {
            v.map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
        .collect();
    (DataType::Utf8, Arc::new(array))
}

/// Convert upstream records to a bronze batch.
///
/// Every element must be a JSON object. Rows whose `timestamp` is missing
/// or not numeric are dropped and counted. The surviving rows get
/// `timestamp` as Int64 epoch milliseconds plus derived `ts_utc`, `date`
/// and `hour` columns.
pub fn records_to_batch(records: &[Value]) -> Result<IngestBatch> {
    let mut objects = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match record {
            Value::Object(map) => objects.push(map),
            other => {
                return Err(Error::InvalidPayload(format!(
                    "record {index} is a {}, expected an object",
                    json_kind(other)
                )))
            }
        }
    }

    let mut kept = Vec::with_capacity(objects.len());
    let mut stamps = Vec::with_capacity(objects.len());
    let mut keys = Vec::with_capacity(objects.len());
    for object in &objects {
        let parsed = coerce_timestamp(object.get(TIMESTAMP))
            .and_then(|ts| PartitionKey::from_millis(ts).map(|key| (ts, key)));
        if let Some((ts, key)) = parsed {
            kept.push(*object);
            stamps.push(ts);
            keys.push(key);
        }
    }
    let rows_dropped = objects.len() - kept.len();
    if rows_dropped > 0 {
        info!(rows_dropped, "dropped records with missing or invalid timestamp");
    }

    let mut names: Vec<&str> = Vec::new();
    for object in &kept {
        for name in object.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }
    if let Some(clash) = names.iter().find(|n| DERIVED.contains(*n)) {
        warn!(column = *clash, "upstream field shadows a derived column, ignoring it");
    }

    let mut fields = Vec::with_capacity(names.len() + DERIVED.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(names.len() + DERIVED.len());
    for name in names.iter().filter(|n| !DERIVED.contains(*n)) {
        let (data_type, array) = if *name == TIMESTAMP {
            (DataType::Int64, Arc::new(Int64Array::from(stamps.clone())) as ArrayRef)
        } else {
            infer_column(name, &kept)
        };
        fields.push(Field::new(*name, data_type, true));
        columns.push(array);
    }

    fields.push(Field::new(TS_UTC, schema::ts_utc_type(), true));
    columns.push(Arc::new(
        TimestampMillisecondArray::from(stamps).with_timezone("UTC"),
    ));
    fields.push(Field::new(DATE, schema::date_type(), false));
    columns.push(Arc::new(StringArray::from_iter_values(
        keys.iter().map(PartitionKey::date_string),
    )));
    fields.push(Field::new(HOUR, schema::hour_type(), false));
    columns.push(Arc::new(Int16Array::from_iter_values(
        keys.iter().map(|k| i16::from(k.hour)),
    )));

    let options = RecordBatchOptions::new().with_row_count(Some(kept.len()));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)?;
    Ok(IngestBatch {
        batch,
        rows_received: records.len(),
        rows_dropped,
    })
}

/// Convert `records` and append them to the bronze `dataset`.
///
/// When no record survives, nothing is written.
pub fn ingest_bronze(
    store: &dyn DatasetStore,
    dataset: &str,
    records: &[Value],
) -> Result<IngestSummary> {
    let ingest = records_to_batch(records)?;
    let mut summary = IngestSummary {
        dataset: dataset.to_string(),
        rows_received: ingest.rows_received,
        rows_dropped: ingest.rows_dropped,
        rows_written: 0,
        partitions: Vec::new(),
    };
    if ingest.batch.num_rows() == 0 {
        warn!(dataset, received = summary.rows_received, "no valid records, nothing written");
        return Ok(summary);
    }

    let written = store.write_partitioned(dataset, &ingest.batch, WriteMode::Append)?;
    summary.rows_written = written.rows_written;
    summary.partitions = written.partitions.iter().map(ToString::to_string).collect();
    info!(
        dataset,
        rows = summary.rows_written,
        partitions = summary.partitions.len(),
        "bronze batch appended"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Float64Type, Int16Type, Int64Type};
    use serde_json::json;
    use vt_common::schema::VELOCITY;
    use vt_store::MemoryStore;

    // 2024-03-11T00:00:00Z
    const MIDNIGHT: i64 = 1_710_115_200_000;

    #[test]
    fn invalid_timestamps_are_dropped_and_counted() {
        let records = vec![
            json!({"vin": "A", "timestamp": MIDNIGHT}),
            json!({"vin": "B"}),
            json!({"vin": "C", "timestamp": null}),
            json!({"vin": "D", "timestamp": "soon"}),
            json!({"vin": "E", "timestamp": "1710118800000"}),
            json!({"vin": "F", "timestamp": 1_710_118_800_999.7}),
        ];
        let out = records_to_batch(&records).unwrap();
        assert_eq!(out.rows_received, 6);
        assert_eq!(out.rows_dropped, 3);

        let batch = &out.batch;
        let ts = batch.column_by_name(TIMESTAMP).unwrap().as_primitive::<Int64Type>();
        assert_eq!(ts.values().to_vec(), vec![MIDNIGHT, 1_710_118_800_000, 1_710_118_800_999]);
        let hours = batch.column_by_name(HOUR).unwrap().as_primitive::<Int16Type>();
        assert_eq!(hours.values().to_vec(), vec![0, 1, 1]);
        let dates = batch.column_by_name(DATE).unwrap().as_string::<i32>();
        assert_eq!(dates.value(0), "2024-03-11");
        assert_eq!(
            batch.column_by_name(TS_UTC).unwrap().data_type(),
            &schema::ts_utc_type()
        );
    }

    #[test]
    fn column_types_are_inferred_across_rows() {
        let records = vec![
            json!({"timestamp": MIDNIGHT, "vin": "A", "velocity": 10, "gearPosition": 3, "ok": true}),
            json!({"timestamp": MIDNIGHT, "vin": "B", "velocity": 12.5, "gearPosition": "NEUTRAL", "odd": 1}),
            json!({"timestamp": MIDNIGHT, "vin": "C", "velocity": null, "odd": "x"}),
        ];
        let batch = records_to_batch(&records).unwrap().batch;
        let schema = batch.schema();
        let type_of = |name: &str| schema.field_with_name(name).unwrap().data_type().clone();

        assert_eq!(type_of("velocity"), DataType::Float64);
        assert_eq!(type_of("gearPosition"), DataType::Utf8);
        assert_eq!(type_of("ok"), DataType::Boolean);
        assert_eq!(type_of("odd"), DataType::Utf8);

        let gears = batch.column_by_name("gearPosition").unwrap().as_string::<i32>();
        assert_eq!(gears.value(0), "3");
        assert!(gears.is_null(2));
        let odd = batch.column_by_name("odd").unwrap().as_string::<i32>();
        assert_eq!(odd.value(1), "1");

        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "gearPosition",
                "ok",
                "timestamp",
                "velocity",
                "vin",
                "odd",
                "ts_utc",
                "date",
                "hour"
            ]
        );
    }

    #[test]
    fn velocity_is_float_even_when_every_value_is_integral() {
        let whole = records_to_batch(&[json!({"timestamp": MIDNIGHT, "velocity": 10})]).unwrap();
        let missing = records_to_batch(&[json!({"timestamp": MIDNIGHT, "velocity": null})]).unwrap();
        let text = records_to_batch(&[json!({"timestamp": MIDNIGHT, "velocity": "fast"})]).unwrap();
        let type_of = |b: &IngestBatch| b.batch.column_by_name(VELOCITY).unwrap().data_type().clone();

        assert_eq!(type_of(&whole), DataType::Float64);
        assert_eq!(type_of(&missing), DataType::Float64);
        assert_eq!(type_of(&text), DataType::Utf8);
        let velocity = whole.batch.column_by_name(VELOCITY).unwrap();
        assert_eq!(velocity.as_primitive::<Float64Type>().value(0), 10.0);
    }

    #[test]
    fn non_object_record_is_rejected() {
        let err = records_to_batch(&[json!([1, 2])]).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }

    #[test]
    fn ingest_appends_and_skips_empty_batches() {
        let store = MemoryStore::new();
        let summary = ingest_bronze(&store, "bronze", &[json!({"vin": "A"})]).unwrap();
        assert_eq!(summary.rows_written, 0);
        assert!(!store.contains("bronze"));

        let records = vec![json!({"vin": "A", "timestamp": MIDNIGHT})];
        ingest_bronze(&store, "bronze", &records).unwrap();
        let summary = ingest_bronze(&store, "bronze", &records).unwrap();
        assert_eq!(summary.partitions, vec!["date=2024-03-11/hour=0"]);
        assert_eq!(store.read_all("bronze").unwrap().num_rows(), 2);
    }

    /// Serve one canned HTTP response; the join handle yields the request.
    fn serve_once(status: &str, body: &str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{Read, Write};
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/upstream/vehicle_messages", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).unwrap();
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (url, handle)
    }

    #[test]
    fn fetch_sends_amount_and_parses_array() {
        let (url, server) = serve_once("200 OK", r#"[{"vin": "A", "timestamp": 1}]"#);
        let config = IngestConfig {
            api_url: url,
            amount: 25,
            timeout_secs: 5,
        };
        let records = fetch_messages(&config).unwrap();
        assert_eq!(records, vec![json!({"vin": "A", "timestamp": 1})]);
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /upstream/vehicle_messages?amount=25 "));
    }

    #[test]
    fn fetch_rejects_error_status_and_non_array_body() {
        let (url, server) = serve_once("503 Service Unavailable", "{}");
        let err = HttpSource::new(url, Duration::from_secs(5)).fetch(1).unwrap_err();
        assert!(matches!(err, Error::Fetch(ref m) if m.contains("503")), "{err}");
        server.join().unwrap();

        let (url, server) = serve_once("200 OK", r#"{"vin": "A"}"#);
        let err = HttpSource::new(url, Duration::from_secs(5)).fetch(1).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)), "{err}");
        server.join().unwrap();
    }

    #[test]
    fn static_source_honours_amount() {
        let source = StaticSource::new(vec![json!({}), json!({}), json!({})]);
        assert_eq!(source.fetch(2).unwrap().len(), 2);
    }
}
