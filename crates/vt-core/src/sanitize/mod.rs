//! Silver sanitation engine.
//!
//! Turns the raw bronze dataset into a deduplicated, validated silver
//! dataset. Stages run in a fixed order, each taking an immutable batch and
//! returning a new batch plus a [`StageReport`]:
//!
//! 1. load the whole bronze dataset
//! 2. trim `manufacturer` whitespace
//! 3. drop null/empty VINs
//! 4. normalize `gearPosition` aliases and drop unparsable gears
//! 5. drop velocity outliers (configuration-gated)
//! 6. resolve (`vin`, `timestamp`) collisions, last record wins
//! 7. validate partition keys and overwrite the touched silver partitions
//!
//! Any schema defect aborts the run before the write. Row-level defects are
//! filtered and counted.

pub mod dedup;
pub mod filter;
pub mod normalize;
pub mod partition;
pub mod stage;

pub use dedup::resolve_collisions;
pub use filter::{coerce_velocity, drop_invalid_vins, filter_velocity_outliers};
pub use normalize::{normalize_gear_position, trim_manufacturer};
pub use partition::validate_partitions;
pub use stage::{Stage, StageOutput, StageReport};

use arrow::record_batch::RecordBatch;
use serde::Serialize;
use tracing::{info, info_span};
use vt_common::{PartitionKey, Result};
use vt_config::SanitizeConfig;
use vt_store::{DatasetStore, WriteMode};

/// Result of running the in-memory stages over one batch.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    pub batch: RecordBatch,
    pub reports: Vec<StageReport>,
    /// Distinct partition keys of `batch`, in first-appearance order.
    pub partitions: Vec<PartitionKey>,
}

/// Summary of a full bronze to silver run.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizeSummary {
    pub bronze: String,
    pub silver: String,
    pub rows_read: usize,
    pub rows_written: usize,
    /// Silver partitions that were overwritten.
    pub partitions: Vec<String>,
    pub stages: Vec<StageReport>,
}

/// Runs the sanitation stages with a fixed configuration.
#[derive(Debug, Clone, Copy)]
pub struct SanitationEngine {
    config: SanitizeConfig,
}

impl SanitationEngine {
    pub fn new(config: SanitizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SanitizeConfig {
        &self.config
    }

    /// Apply stages 2-6 and validate the partition keys of the result.
    ///
    /// Pure: performs no I/O and never mutates `bronze`.
    pub fn run(&self, bronze: &RecordBatch) -> Result<SanitizeOutcome> {
        let mut reports = Vec::with_capacity(6);

        let out = trim_manufacturer(bronze)?;
        reports.push(out.report);
        let out = drop_invalid_vins(&out.batch)?;
        reports.push(out.report);
        let out = normalize_gear_position(&out.batch)?;
        reports.push(out.report);
        let out = self.velocity_stage(&out.batch)?;
        reports.push(out.report);
        let out = resolve_collisions(&out.batch)?;
        reports.push(out.report);

        let partitions = validate_partitions(&out.batch)?;
        Ok(SanitizeOutcome {
            batch: out.batch,
            reports,
            partitions,
        })
    }

    fn velocity_stage(&self, batch: &RecordBatch) -> Result<StageOutput> {
        if !self.config.apply_velocity_filter {
            info!(stage = %Stage::VelocityFilter, "velocity outlier filter disabled");
            return coerce_velocity(batch);
        }
        filter_velocity_outliers(
            batch,
            self.config.min_velocity as f64,
            self.config.max_velocity as f64,
        )
    }
}

/// Load `bronze` from `store`, sanitize it, and overwrite the touched
/// partitions of `silver`.
///
/// Nothing is written unless every stage and the partition validation
/// succeed.
pub fn sanitize_dataset(
    store: &dyn DatasetStore,
    bronze: &str,
    silver: &str,
    config: &SanitizeConfig,
) -> Result<SanitizeSummary> {
    let span = info_span!("sanitize", bronze, silver);
    let _guard = span.enter();

    let raw = store.read_all(bronze)?;
    info!(
        stage = %Stage::Load,
        rows = raw.num_rows(),
        columns = raw.num_columns(),
        "bronze loaded"
    );
    let mut stages = vec![StageReport::new(Stage::Load, raw.num_rows(), raw.num_rows())];

    let outcome = SanitationEngine::new(*config).run(&raw)?;
    stages.extend(outcome.reports);

    let written = store.write_partitioned(silver, &outcome.batch, WriteMode::OverwriteOrIgnore)?;
    stages.push(StageReport::new(
        Stage::PartitionWrite,
        outcome.batch.num_rows(),
        written.rows_written,
    ));
    info!(
        stage = %Stage::PartitionWrite,
        rows = written.rows_written,
        partitions = written.partitions.len(),
        "silver partitions overwritten"
    );

    Ok(SanitizeSummary {
        bronze: bronze.to_string(),
        silver: silver.to_string(),
        rows_read: raw.num_rows(),
        rows_written: written.rows_written,
        partitions: written.partitions.iter().map(ToString::to_string).collect(),
        stages,
    })
}
