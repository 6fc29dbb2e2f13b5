//! Gold tier: last known state per vehicle.

use crate::columns::{nulls_last, required, text, timestamp_millis};
use arrow::array::{Array, ArrayRef, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use vt_common::schema::{self, FRONT_LEFT_DOOR_STATE, TS_UTC, VIN, WIPERS_STATE};
use vt_common::Result;
use vt_store::DatasetStore;

/// File name of the last-state table inside the gold dataset.
pub const GOLD_TABLE: &str = "vin_last_state.parquet";

pub const LAST_REPORTED_TIMESTAMP: &str = "last_reported_timestamp";
pub const FRONT_LEFT_DOOR_STATE_OUT: &str = "front_left_door_state";
pub const WIPERS_STATE_OUT: &str = "wipers_state";

#[derive(Debug, Default)]
struct LastState {
    last_reported: Option<i64>,
    door: Option<String>,
    wipers: Option<String>,
}

/// Optional state column as text, all-null when absent.
fn state_column(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    match batch.column_by_name(name) {
        Some(column) => text(column.as_ref()),
        None => Ok(StringArray::new_null(batch.num_rows())),
    }
}

/// One row per VIN, ordered by VIN: the latest `ts_utc` and the last
/// non-null door and wiper states after ordering each VIN's rows by time.
pub fn vin_last_state(silver: &RecordBatch) -> Result<RecordBatch> {
    let vins = text(required(silver, VIN, "gold")?.as_ref())?;
    let ts = timestamp_millis(required(silver, TS_UTC, "gold")?.as_ref())?;
    let doors = state_column(silver, FRONT_LEFT_DOOR_STATE)?;
    let wipers = state_column(silver, WIPERS_STATE)?;

    let mut order: Vec<usize> = (0..silver.num_rows()).filter(|&r| vins.is_valid(r)).collect();
    order.sort_by(|&a, &b| {
        vins.value(a)
            .cmp(vins.value(b))
            .then_with(|| nulls_last(&ts[a], &ts[b]))
    });

    let mut states: BTreeMap<&str, LastState> = BTreeMap::new();
    for row in order {
        let state = states.entry(vins.value(row)).or_default();
        state.last_reported = state.last_reported.max(ts[row]);
        if doors.is_valid(row) {
            state.door = Some(doors.value(row).to_string());
        }
        if wipers.is_valid(row) {
            state.wipers = Some(wipers.value(row).to_string());
        }
    }

    let schema = Schema::new(vec![
        Field::new(VIN, DataType::Utf8, false),
        Field::new(LAST_REPORTED_TIMESTAMP, schema::ts_utc_type(), true),
        Field::new(FRONT_LEFT_DOOR_STATE_OUT, DataType::Utf8, true),
        Field::new(WIPERS_STATE_OUT, DataType::Utf8, true),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(states.keys())),
        Arc::new(
            TimestampMillisecondArray::from_iter(states.values().map(|s| s.last_reported))
                .with_timezone("UTC"),
        ),
        Arc::new(StringArray::from_iter(states.values().map(|s| s.door.as_deref()))),
        Arc::new(StringArray::from_iter(states.values().map(|s| s.wipers.as_deref()))),
    ];
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

/// Outcome of a gold rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct GoldSummary {
    pub dataset: String,
    pub table: String,
    pub silver_rows: usize,
    pub vins: usize,
}

/// Rebuild the last-state table from the whole silver dataset.
pub fn build_gold(store: &dyn DatasetStore, silver: &str, gold: &str) -> Result<GoldSummary> {
    let batch = store.read_all(silver)?;
    let state = vin_last_state(&batch)?;
    store.write_table(gold, GOLD_TABLE, &state)?;
    info!(
        silver,
        gold,
        silver_rows = batch.num_rows(),
        vins = state.num_rows(),
        "gold last-state table written"
    );
    Ok(GoldSummary {
        dataset: gold.to_string(),
        table: GOLD_TABLE.to_string(),
        silver_rows: batch.num_rows(),
        vins: state.num_rows(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::TimestampMillisecondType;

    fn silver(rows: &[(&str, Option<i64>, Option<&str>, Option<&str>)]) -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new(VIN, DataType::Utf8, true),
                Field::new(TS_UTC, schema::ts_utc_type(), true),
                Field::new(FRONT_LEFT_DOOR_STATE, DataType::Utf8, true),
                Field::new(WIPERS_STATE, DataType::Utf8, true),
            ])),
            vec![
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))),
                Arc::new(
                    TimestampMillisecondArray::from_iter(rows.iter().map(|r| r.1))
                        .with_timezone("UTC"),
                ),
                Arc::new(StringArray::from_iter(rows.iter().map(|r| r.2))),
                Arc::new(StringArray::from_iter(rows.iter().map(|r| r.3))),
            ],
        )
        .unwrap()
    }

    #[test]
    fn last_non_null_states_win() {
        let batch = silver(&[
            ("B", Some(30), Some("OPEN"), None),
            ("A", Some(20), None, Some("ON")),
            ("A", Some(10), Some("CLOSED"), Some("OFF")),
            ("A", Some(5), Some("OPEN"), None),
        ]);
        let out = vin_last_state(&batch).unwrap();
        assert_eq!(out.num_rows(), 2);

        let vins = out.column(0).as_string::<i32>();
        assert_eq!((vins.value(0), vins.value(1)), ("A", "B"));
        let ts = out.column(1).as_primitive::<TimestampMillisecondType>();
        assert_eq!((ts.value(0), ts.value(1)), (20, 30));
        let doors = out.column(2).as_string::<i32>();
        assert_eq!(doors.value(0), "CLOSED");
        assert_eq!(doors.value(1), "OPEN");
        let wipers = out.column(3).as_string::<i32>();
        assert_eq!(wipers.value(0), "ON");
        assert!(wipers.is_null(1), "B never reported a wiper state");
    }

    #[test]
    fn absent_state_columns_yield_nulls() {
        let batch = silver(&[("A", Some(1), None, None)]).project(&[0, 1]).unwrap();
        let out = vin_last_state(&batch).unwrap();
        assert_eq!(out.schema().field(2).name(), FRONT_LEFT_DOOR_STATE_OUT);
        assert!(out.column(2).is_null(0));
        assert!(out.column(3).is_null(0));
    }

    #[test]
    fn build_gold_writes_table() {
        use vt_store::{MemoryStore, WriteMode};
        let store = MemoryStore::new();
        let batch = silver(&[("A", Some(1_710_115_200_000), Some("OPEN"), None)]);
        let with_keys = vt_store::layout::with_partition_columns(
            &batch,
            &vt_common::PartitionKey::from_millis(1_710_115_200_000).unwrap(),
        )
        .unwrap();
        store
            .write_partitioned("silver", &with_keys, WriteMode::OverwriteOrIgnore)
            .unwrap();

        let summary = build_gold(&store, "silver", "gold").unwrap();
        assert_eq!(summary.vins, 1);
        let table = store.read_table("gold", GOLD_TABLE).unwrap();
        assert_eq!(table.num_columns(), 4);
    }
}
