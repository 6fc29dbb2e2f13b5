//! Vehicle telemetry pipeline library.
//!
//! Tiers, in data-flow order:
//! - [`ingest`]: upstream messages to the append-only bronze dataset
//! - [`sanitize`]: bronze to the deduplicated, validated silver dataset
//! - [`gold`]: last known state per VIN
//! - [`report`]: fastest vehicles per hour
//! - [`scan`]: SQL-injection detection over any dataset
//!
//! [`pipeline`] wires them to a store and a resolved configuration.

pub mod columns;
pub mod exit_codes;
pub mod gold;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod sanitize;
pub mod scan;

pub use sanitize::{sanitize_dataset, SanitationEngine, SanitizeOutcome, SanitizeSummary};
