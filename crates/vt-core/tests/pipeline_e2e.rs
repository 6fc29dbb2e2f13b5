//! End-to-end pipeline runs against a Parquet store in a temp directory.

use arrow::array::{Array, AsArray};
use serde_json::{json, Value};
use tempfile::TempDir;
use vt_common::{Error, RunId};
use vt_config::PipelineConfig;
use vt_core::gold::{FRONT_LEFT_DOOR_STATE_OUT, GOLD_TABLE, WIPERS_STATE_OUT};
use vt_core::ingest::StaticSource;
use vt_core::pipeline::{Pipeline, DEFAULT_PROBE_PAYLOAD};
use vt_store::{DatasetStore, ParquetStore};

// 2024-03-11T00:00:00Z
const MIDNIGHT: i64 = 1_710_115_200_000;
const HOUR: i64 = 3_600_000;

fn messages() -> Vec<Value> {
    vec![
        json!({"vin": "VIN1", "timestamp": MIDNIGHT + 10, "velocity": 80, "gearPosition": "3",
               "manufacturer": " Volvo ", "frontLeftDoorState": "CLOSED", "wipersState": false}),
        json!({"vin": "VIN1", "timestamp": MIDNIGHT + 20, "velocity": 95, "gearPosition": "4",
               "manufacturer": "Volvo", "frontLeftDoorState": "OPEN", "wipersState": true}),
        json!({"vin": "VIN2", "timestamp": MIDNIGHT + 30, "velocity": 120, "gearPosition": "NEUTRAL",
               "manufacturer": "Kia", "frontLeftDoorState": "CLOSED", "wipersState": false}),
        json!({"vin": "VIN2", "timestamp": MIDNIGHT + HOUR, "velocity": 410, "gearPosition": "5",
               "manufacturer": "Kia", "frontLeftDoorState": null, "wipersState": null}),
        json!({"vin": "", "timestamp": MIDNIGHT + HOUR, "velocity": 50, "gearPosition": "1"}),
        json!({"vin": "VIN3", "timestamp": MIDNIGHT + HOUR + 5, "velocity": 60, "gearPosition": "PARK"}),
        json!({"vin": "VIN3", "velocity": 60}),
    ]
}

fn config_in(dir: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.sanitize.apply_velocity_filter = true;
    config.sanitize.max_velocity = 300;
    config
}

#[test]
fn full_run_produces_silver_gold_and_report() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = ParquetStore::new(dir.path());
    let pipeline = Pipeline::new(&store, &config);

    let summary = pipeline
        .run_all(&RunId::new(), &StaticSource::new(messages()))
        .unwrap();

    assert_eq!(summary.ingest.rows_received, 7);
    assert_eq!(summary.ingest.rows_dropped, 1);
    assert_eq!(summary.ingest.rows_written, 6);
    assert_eq!(
        summary.ingest.partitions,
        vec!["date=2024-03-11/hour=0", "date=2024-03-11/hour=1"]
    );

    // Dropped: empty vin, PARK gear, 410 km/h.
    assert_eq!(summary.sanitize.rows_read, 6);
    assert_eq!(summary.sanitize.rows_written, 3);
    assert!(dir
        .path()
        .join("messages_silver/date=2024-03-11/hour=0")
        .is_dir());

    let silver = store.read_all(&config.storage.silver).unwrap();
    let manufacturers: Vec<_> = silver
        .column_by_name("manufacturer")
        .unwrap()
        .as_string::<i32>()
        .iter()
        .flatten()
        .map(str::to_string)
        .collect();
    assert!(manufacturers.iter().all(|m| m.trim() == m));

    assert_eq!(summary.gold.vins, 2);
    let gold = store.read_table(&config.storage.gold, GOLD_TABLE).unwrap();
    let doors = gold
        .column_by_name(FRONT_LEFT_DOOR_STATE_OUT)
        .unwrap()
        .as_string::<i32>();
    assert_eq!(doors.value(0), "OPEN");
    assert_eq!(doors.value(1), "CLOSED");
    let wipers = gold.column_by_name(WIPERS_STATE_OUT).unwrap().as_string::<i32>();
    assert_eq!(wipers.value(0), "true");

    let report = std::fs::read_to_string(pipeline.top_speed_report_path()).unwrap();
    let lines: Vec<_> = report.lines().collect();
    assert_eq!(lines[0], "date_hour,vin,top_velocity");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("2024-03-11 00:00:00+00:00,VIN2,120"));
    assert!(lines[2].starts_with("2024-03-11 00:00:00+00:00,VIN1,95"));
    assert_eq!(summary.report.hours, 1);
}

#[test]
fn second_ingest_appends_and_resanitize_replaces_partitions() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = ParquetStore::new(dir.path());
    let pipeline = Pipeline::new(&store, &config);

    let batch = vec![json!({"vin": "VIN9", "timestamp": MIDNIGHT, "velocity": 10})];
    pipeline.ingest(&StaticSource::new(batch.clone())).unwrap();
    pipeline.ingest(&StaticSource::new(batch)).unwrap();
    assert_eq!(store.read_all(&config.storage.bronze).unwrap().num_rows(), 2);

    let first = pipeline.sanitize().unwrap();
    let second = pipeline.sanitize().unwrap();
    assert_eq!(first.rows_written, 1);
    assert_eq!(second.rows_written, 1);
    assert_eq!(store.read_all(&config.storage.silver).unwrap().num_rows(), 1);
}

#[test]
fn ingests_with_different_field_types_stay_readable() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = ParquetStore::new(dir.path());
    let pipeline = Pipeline::new(&store, &config);

    pipeline
        .ingest(&StaticSource::new(vec![
            json!({"vin": "VIN9", "timestamp": MIDNIGHT, "velocity": 10, "odometer": 7}),
        ]))
        .unwrap();
    pipeline
        .ingest(&StaticSource::new(vec![
            json!({"vin": "VIN8", "timestamp": MIDNIGHT + 5, "velocity": 10.5,
                   "odometer": "n/a", "wipersState": true}),
        ]))
        .unwrap();

    let bronze = store.read_all(&config.storage.bronze).unwrap();
    assert_eq!(bronze.num_rows(), 2);
    let odometer = bronze.column_by_name("odometer").unwrap().as_string::<i32>();
    assert_eq!((odometer.value(0), odometer.value(1)), ("7", "n/a"));
    assert!(bronze.column_by_name("wipersState").unwrap().is_null(0));

    let summary = pipeline.sanitize().unwrap();
    assert_eq!(summary.rows_written, 2);
    assert_eq!(pipeline.gold().unwrap().vins, 2);
}

#[test]
fn injection_probe_is_detected_and_clean_data_is_not() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = ParquetStore::new(dir.path());
    let pipeline = Pipeline::new(&store, &config);
    pipeline.ingest(&StaticSource::new(messages())).unwrap();

    let clean = pipeline.scan(Some(config.storage.bronze.as_str())).unwrap();
    assert_eq!(clean.violations, 0);
    assert!(clean.report.is_none());
    assert!(!pipeline.scan_report_path().exists());

    let injected = pipeline
        .simulate_injection("vin", DEFAULT_PROBE_PAYLOAD)
        .unwrap();
    assert_eq!(injected.rows_written, 7);

    let scan = pipeline.scan(None).unwrap();
    assert_eq!(scan.dataset, config.storage.injected);
    assert_eq!(scan.rows_scanned, 7);
    assert_eq!(scan.violations, 1);
    let report = std::fs::read_to_string(scan.report.unwrap()).unwrap();
    assert!(report.starts_with("column,value,pattern"));
    assert!(report.contains(DEFAULT_PROBE_PAYLOAD));
}

#[test]
fn sanitize_without_bronze_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = ParquetStore::new(dir.path());
    let err = Pipeline::new(&store, &config).sanitize().unwrap_err();
    assert!(matches!(err, Error::DatasetNotFound(_)), "{err}");
    assert!(!dir.path().join("messages_silver").exists());
}

#[test]
fn empty_fetch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = ParquetStore::new(dir.path());
    let summary = Pipeline::new(&store, &config)
        .ingest(&StaticSource::new(Vec::new()))
        .unwrap();
    assert_eq!(summary.rows_written, 0);
    assert!(summary.partitions.is_empty());
    assert!(!dir.path().join("messages_bronze").exists());
}
