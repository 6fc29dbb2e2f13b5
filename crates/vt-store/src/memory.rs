//! In-memory store with the same partition and overwrite semantics as
//! [`crate::ParquetStore`]. Used for tests and dry runs.

use crate::layout::{assemble, split_by_partition};
use crate::{DatasetStore, WriteMode, WriteSummary};
use arrow::record_batch::RecordBatch;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use vt_common::{Error, PartitionKey, Result};

#[derive(Debug, Default)]
struct MemDataset {
    partitions: BTreeMap<PartitionKey, Vec<RecordBatch>>,
    tables: HashMap<String, RecordBatch>,
}

/// Datasets held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: Mutex<HashMap<String, MemDataset>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemDataset>> {
        // Every mutation is a single insert or replace, so a poisoned lock
        // still guards consistent data.
        self.datasets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether anything has been written under `dataset`.
    pub fn contains(&self, dataset: &str) -> bool {
        self.lock().contains_key(dataset)
    }
}

impl DatasetStore for MemoryStore {
    fn read_all(&self, dataset: &str) -> Result<RecordBatch> {
        let datasets = self.lock();
        let data = datasets
            .get(dataset)
            .ok_or_else(|| Error::DatasetNotFound(dataset.to_string()))?;
        let parts: Vec<(PartitionKey, RecordBatch)> = data
            .partitions
            .iter()
            .flat_map(|(key, batches)| batches.iter().map(move |b| (key.clone(), b.clone())))
            .collect();
        assemble(dataset, &parts)
    }

    fn write_partitioned(
        &self,
        dataset: &str,
        batch: &RecordBatch,
        mode: WriteMode,
    ) -> Result<WriteSummary> {
        let parts = split_by_partition(batch)?;
        let mut datasets = self.lock();
        let data = datasets.entry(dataset.to_string()).or_default();
        let mut summary = WriteSummary::default();

        for (key, payload) in parts {
            summary.rows_written += payload.num_rows();
            summary.partitions.push(key.clone());
            let slot = data.partitions.entry(key).or_default();
            if mode == WriteMode::OverwriteOrIgnore {
                slot.clear();
            }
            slot.push(payload);
        }
        Ok(summary)
    }

    fn partitions(&self, dataset: &str) -> Result<Vec<PartitionKey>> {
        let datasets = self.lock();
        let data = datasets
            .get(dataset)
            .ok_or_else(|| Error::DatasetNotFound(dataset.to_string()))?;
        Ok(data.partitions.keys().cloned().collect())
    }

    fn write_table(&self, dataset: &str, name: &str, batch: &RecordBatch) -> Result<()> {
        self.lock()
            .entry(dataset.to_string())
            .or_default()
            .tables
            .insert(name.to_string(), batch.clone());
        Ok(())
    }

    fn read_table(&self, dataset: &str, name: &str) -> Result<RecordBatch> {
        self.lock()
            .get(dataset)
            .and_then(|d| d.tables.get(name).cloned())
            .ok_or_else(|| Error::DatasetNotFound(format!("{dataset}/{name}")))
    }
}
