//! Vehicle telemetry dataset storage.
//!
//! This crate provides:
//! - The [`DatasetStore`] trait used by every pipeline tier
//! - A Hive-partitioned Parquet implementation ([`ParquetStore`])
//! - An in-memory implementation with the same semantics ([`MemoryStore`])
//! - Path layout and partitioning helpers

pub mod layout;
pub mod memory;
pub mod parquet_store;

pub use memory::MemoryStore;
pub use parquet_store::ParquetStore;

use arrow::record_batch::RecordBatch;
use std::path::PathBuf;
use vt_common::{PartitionKey, Result};

/// File written into each partition by an overwrite.
pub const OVERWRITE_FILE_NAME: &str = "part-0.parquet";

/// Collision policy for partitioned writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add a new file next to whatever the partition already holds.
    Append,
    /// Replace the contents of every partition present in the batch; leave
    /// all other partitions untouched.
    OverwriteOrIgnore,
}

/// Outcome of a partitioned write.
#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    pub rows_written: usize,
    pub partitions: Vec<PartitionKey>,
    /// Files created (empty for in-memory stores).
    pub files: Vec<PathBuf>,
}

/// Read/write access to named datasets.
///
/// Partitioned datasets are keyed by the `date` and `hour` columns.
/// Implementations validate the partition keys of every row before writing
/// anything, so a failed write leaves prior data untouched.
pub trait DatasetStore {
    /// Every record under `dataset` as one batch, with `date` and `hour`
    /// columns reconstructed. Row order is deterministic: partitions by
    /// (date, hour), then files/batches in storage order.
    fn read_all(&self, dataset: &str) -> Result<RecordBatch>;

    /// Write `batch` partitioned by (`date`, `hour`).
    fn write_partitioned(&self, dataset: &str, batch: &RecordBatch, mode: WriteMode)
        -> Result<WriteSummary>;

    /// Partitions currently holding data, sorted.
    fn partitions(&self, dataset: &str) -> Result<Vec<PartitionKey>>;

    /// Write a single unpartitioned table, replacing any previous one.
    fn write_table(&self, dataset: &str, name: &str, batch: &RecordBatch) -> Result<()>;

    /// Read a table written by [`DatasetStore::write_table`].
    fn read_table(&self, dataset: &str, name: &str) -> Result<RecordBatch>;
}
