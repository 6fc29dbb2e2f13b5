//! Stage identities and per-stage reports.

use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Sanitation stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    ManufacturerWhitespace,
    VinFilter,
    GearPosition,
    VelocityFilter,
    Collisions,
    PartitionWrite,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::ManufacturerWhitespace => "manufacturer_whitespace",
            Stage::VinFilter => "vin_filter",
            Stage::GearPosition => "gear_position",
            Stage::VelocityFilter => "velocity_filter",
            Stage::Collisions => "collisions",
            Stage::PartitionWrite => "partition_write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cardinality effect of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rows whose value was rewritten in place.
    pub rows_changed: usize,
    /// Distinct raw values that were rewritten, with row counts.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub changed_values: BTreeMap<String, usize>,
    /// Distinct raw values (or drop reasons) that removed rows, with counts.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dropped_values: BTreeMap<String, usize>,
    /// The stage did not run (column absent or feature disabled).
    pub skipped: bool,
}

impl StageReport {
    pub fn new(stage: Stage, rows_in: usize, rows_out: usize) -> Self {
        Self {
            stage,
            rows_in,
            rows_out,
            rows_changed: 0,
            changed_values: BTreeMap::new(),
            dropped_values: BTreeMap::new(),
            skipped: false,
        }
    }

    /// Report for a stage that passed its input through untouched.
    pub fn skipped(stage: Stage, rows: usize) -> Self {
        Self {
            skipped: true,
            ..Self::new(stage, rows, rows)
        }
    }

    pub fn rows_dropped(&self) -> usize {
        self.rows_in.saturating_sub(self.rows_out)
    }
}

/// A stage's output batch with its report. Inputs are never mutated.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub batch: RecordBatch,
    pub report: StageReport,
}

impl StageOutput {
    pub fn skipped(stage: Stage, batch: &RecordBatch) -> Self {
        Self {
            report: StageReport::skipped(stage, batch.num_rows()),
            batch: batch.clone(),
        }
    }
}

/// Count occurrences of `value` in a report map.
pub(crate) fn tally(map: &mut BTreeMap<String, usize>, value: impl Into<String>) {
    *map.entry(value.into()).or_insert(0) += 1;
}
