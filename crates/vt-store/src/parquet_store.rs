//! Filesystem store: zstd-compressed Parquet files in a Hive layout.

use crate::layout::{assemble, parse_partition, partition_dir, split_by_partition};
use crate::{DatasetStore, WriteMode, WriteSummary, OVERWRITE_FILE_NAME};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vt_common::{schema, Error, PartitionKey, Result, SCHEMA_VERSION};

const PARQUET_EXTENSION: &str = "parquet";

/// Parquet key-value metadata key holding the schema version.
pub const SCHEMA_VERSION_KEY: &str = "vt.schema_version";

/// Datasets stored as directories under `root`.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset)
    }

    /// Partition directories of `dataset`, sorted by key.
    fn partition_dirs(&self, dataset: &str) -> Result<Vec<(PartitionKey, PathBuf)>> {
        let dir = self.dataset_dir(dataset);
        if !dir.is_dir() {
            return Err(Error::DatasetNotFound(dir.display().to_string()));
        }
        let mut found = Vec::new();
        for date_entry in sorted_entries(&dir)? {
            if !date_entry.is_dir() {
                continue;
            }
            for hour_entry in sorted_entries(&date_entry)? {
                if !hour_entry.is_dir() {
                    continue;
                }
                let key = parse_partition(&file_name(&date_entry), &file_name(&hour_entry));
                match key {
                    Some(key) => found.push((key, hour_entry)),
                    None => debug!(path = %hour_entry.display(), "skipping non-partition directory"),
                }
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}

impl DatasetStore for ParquetStore {
    fn read_all(&self, dataset: &str) -> Result<RecordBatch> {
        let mut parts = Vec::new();
        for (key, dir) in self.partition_dirs(dataset)? {
            for file in parquet_files(&dir)? {
                parts.push((key.clone(), read_parquet_file(&file)?));
            }
        }
        let batch = assemble(dataset, &parts)?;
        info!(dataset, rows = batch.num_rows(), files = parts.len(), "read dataset");
        Ok(batch)
    }

    fn write_partitioned(
        &self,
        dataset: &str,
        batch: &RecordBatch,
        mode: WriteMode,
    ) -> Result<WriteSummary> {
        // Validates every row's partition key before touching the filesystem.
        let parts = split_by_partition(batch)?;
        let dataset_dir = self.dataset_dir(dataset);
        let mut summary = WriteSummary::default();

        for (key, payload) in parts {
            let dir = partition_dir(&dataset_dir, &key);
            fs::create_dir_all(&dir)?;
            let path = match mode {
                WriteMode::Append => {
                    let path = dir.join(append_file_name());
                    write_parquet_file(&path, &payload)?;
                    path
                }
                WriteMode::OverwriteOrIgnore => {
                    let path = dir.join(OVERWRITE_FILE_NAME);
                    write_parquet_file(&path, &payload)?;
                    for stale in parquet_files(&dir)? {
                        if stale != path {
                            fs::remove_file(&stale)?;
                        }
                    }
                    path
                }
            };
            debug!(partition = %key, rows = payload.num_rows(), path = %path.display(), "wrote partition");
            summary.rows_written += payload.num_rows();
            summary.partitions.push(key);
            summary.files.push(path);
        }

        info!(
            dataset,
            ?mode,
            rows = summary.rows_written,
            partitions = summary.partitions.len(),
            "wrote partitioned dataset"
        );
        Ok(summary)
    }

    fn partitions(&self, dataset: &str) -> Result<Vec<PartitionKey>> {
        let mut keys = Vec::new();
        for (key, dir) in self.partition_dirs(dataset)? {
            if !parquet_files(&dir)?.is_empty() {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn write_table(&self, dataset: &str, name: &str, batch: &RecordBatch) -> Result<()> {
        let dir = self.dataset_dir(dataset);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        write_parquet_file(&path, batch)?;
        info!(path = %path.display(), rows = batch.num_rows(), "wrote table");
        Ok(())
    }

    fn read_table(&self, dataset: &str, name: &str) -> Result<RecordBatch> {
        let path = self.dataset_dir(dataset).join(name);
        if !path.is_file() {
            return Err(Error::DatasetNotFound(path.display().to_string()));
        }
        read_parquet_file(&path)
    }
}

/// Write `batch` to `path` via a temporary sibling and a rename, so readers
/// never observe a half-written file.
pub fn write_parquet_file(path: &Path, batch: &RecordBatch) -> Result<()> {
    let tmp = path.with_extension("parquet.tmp");
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_key_value_metadata(Some(vec![KeyValue {
            key: SCHEMA_VERSION_KEY.to_string(),
            value: Some(SCHEMA_VERSION.to_string()),
        }]))
        .build();

    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a whole Parquet file into one batch.
///
/// Files stamped with an incompatible schema major version are rejected;
/// unstamped files are accepted.
pub fn read_parquet_file(path: &Path) -> Result<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let stamped = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == SCHEMA_VERSION_KEY))
        .and_then(|kv| kv.value.clone());
    if let Some(version) = stamped {
        if !schema::is_compatible(&version) {
            return Err(Error::SchemaMismatch(format!(
                "{} was written with schema {version}, expected {SCHEMA_VERSION}",
                path.display()
            )));
        }
    }
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

/// `part-<utc time>-<uuid>.parquet`: unique, and lexicographic order is
/// arrival order.
fn append_file_name() -> String {
    format!(
        "part-{}-{}.{PARQUET_EXTENSION}",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f"),
        uuid::Uuid::new_v4().simple()
    )
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == PARQUET_EXTENSION))
        .filter(|p| !file_name(p).starts_with('.'))
        .collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Int16Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Int64Type, Schema};
    use std::sync::Arc;

    fn table() -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("vin", DataType::Utf8, true),
                Field::new("n", DataType::Int64, false),
            ])),
            vec![
                Arc::new(StringArray::from(vec![Some("A"), None])),
                Arc::new(Int64Array::from(vec![1, 2])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn table_roundtrip_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.write_table("gold", "t.parquet", &table()).unwrap();

        let back = store.read_table("gold", "t.parquet").unwrap();
        assert_eq!(back.columns(), table().columns());
        let names: Vec<_> = fs::read_dir(dir.path().join("gold"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["t.parquet"]);
    }

    fn hour_zero(n: i64) -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("n", DataType::Int64, false),
                Field::new("date", DataType::Utf8, false),
                Field::new("hour", DataType::Int16, false),
            ])),
            vec![
                Arc::new(Int64Array::from(vec![n])),
                Arc::new(StringArray::from(vec!["2024-03-11"])),
                Arc::new(Int16Array::from(vec![0])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn appended_files_read_back_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        for n in 0..5 {
            store.write_partitioned("bronze", &hour_zero(n), WriteMode::Append).unwrap();
        }
        let batch = store.read_all("bronze").unwrap();
        let n = batch.column_by_name("n").unwrap().as_primitive::<Int64Type>();
        assert_eq!(n.values().to_vec(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn incompatible_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.parquet");
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(vec![KeyValue {
                key: SCHEMA_VERSION_KEY.to_string(),
                value: Some("2.0.0".to_string()),
            }]))
            .build();
        let mut writer =
            ArrowWriter::try_new(File::create(&path).unwrap(), table().schema(), Some(props)).unwrap();
        writer.write(&table()).unwrap();
        writer.close().unwrap();

        assert!(matches!(read_parquet_file(&path), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn missing_dataset_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        assert!(matches!(store.read_all("nope"), Err(Error::DatasetNotFound(_))));
        assert!(matches!(store.read_table("nope", "t.parquet"), Err(Error::DatasetNotFound(_))));
    }
}
