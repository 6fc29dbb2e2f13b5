//! Tier orchestration over one store and one resolved configuration.
//!
//! Each method runs one pipeline step end to end. [`Pipeline::run_all`]
//! chains ingest, sanitize, gold and report and stops at the first error,
//! so sanitation never sees a bronze tier whose ingestion failed.

use crate::gold::{build_gold, GoldSummary};
use crate::ingest::{ingest_bronze, IngestSummary, MessageSource};
use crate::report::{build_top_speed_report, ReportSummary};
use crate::sanitize::{sanitize_dataset, SanitizeSummary};
use crate::scan::{inject_probe_row, write_violation_report, InjectionScanner};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use vt_common::{Result, RunId};
use vt_config::PipelineConfig;
use vt_store::{DatasetStore, WriteMode};

/// Payload written by the injection simulator unless overridden.
pub const DEFAULT_PROBE_PAYLOAD: &str = "DROP TABLE users;";

/// Outcome of an injection scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub dataset: String,
    pub rows_scanned: usize,
    pub violations: usize,
    /// Report file, when any violation was found.
    pub report: Option<PathBuf>,
}

/// Outcome of seeding the injected dataset.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionSummary {
    pub source: String,
    pub dataset: String,
    pub column: String,
    pub rows_written: usize,
}

/// Outcome of a full ingest -> sanitize -> gold -> report run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub run_id: RunId,
    pub ingest: IngestSummary,
    pub sanitize: SanitizeSummary,
    pub gold: GoldSummary,
    pub report: ReportSummary,
}

pub struct Pipeline<'a> {
    store: &'a dyn DatasetStore,
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn DatasetStore, config: &'a PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn top_speed_report_path(&self) -> PathBuf {
        self.config
            .storage
            .reports_path()
            .join(&self.config.report.file_name)
    }

    pub fn scan_report_path(&self) -> PathBuf {
        self.config
            .storage
            .reports_path()
            .join(&self.config.scan.report_file)
    }

    pub fn ingest(&self, source: &dyn MessageSource) -> Result<IngestSummary> {
        let records = source.fetch(self.config.ingest.amount)?;
        ingest_bronze(self.store, &self.config.storage.bronze, &records)
    }

    pub fn sanitize(&self) -> Result<SanitizeSummary> {
        let storage = &self.config.storage;
        sanitize_dataset(
            self.store,
            &storage.bronze,
            &storage.silver,
            &self.config.sanitize,
        )
    }

    pub fn gold(&self) -> Result<GoldSummary> {
        build_gold(self.store, &self.config.storage.silver, &self.config.storage.gold)
    }

    pub fn report(&self) -> Result<ReportSummary> {
        build_top_speed_report(
            self.store,
            &self.config.storage.silver,
            &self.top_speed_report_path(),
            self.config.report.top_n,
        )
    }

    /// Scan `dataset` (the injected dataset by default) with the configured
    /// columns and patterns, writing a report only when something matches.
    pub fn scan(&self, dataset: Option<&str>) -> Result<ScanSummary> {
        let dataset = dataset.unwrap_or(self.config.storage.injected.as_str());
        let scanner = InjectionScanner::new(&self.config.scan.patterns)?;
        let batch = self.store.read_all(dataset)?;
        let violations = scanner.scan(&batch, &self.config.scan.columns)?;

        let path = self.scan_report_path();
        let written = write_violation_report(&path, &violations)?;
        Ok(ScanSummary {
            dataset: dataset.to_string(),
            rows_scanned: batch.num_rows(),
            violations: violations.len(),
            report: written.then_some(path),
        })
    }

    /// Copy bronze into the injected dataset with one extra probe row.
    pub fn simulate_injection(&self, column: &str, payload: &str) -> Result<InjectionSummary> {
        let storage = &self.config.storage;
        let bronze = self.store.read_all(&storage.bronze)?;
        let injected = inject_probe_row(&bronze, column, payload)?;
        let written =
            self.store
                .write_partitioned(&storage.injected, &injected, WriteMode::OverwriteOrIgnore)?;
        Ok(InjectionSummary {
            source: storage.bronze.clone(),
            dataset: storage.injected.clone(),
            column: column.to_string(),
            rows_written: written.rows_written,
        })
    }

    /// Ingest, sanitize, rebuild gold and the report, in that order.
    pub fn run_all(&self, run_id: &RunId, source: &dyn MessageSource) -> Result<PipelineSummary> {
        let ingest = self.ingest(source)?;
        let sanitize = self.sanitize()?;
        let gold = self.gold()?;
        let report = self.report()?;
        info!(
            %run_id,
            bronze_rows = ingest.rows_written,
            silver_rows = sanitize.rows_written,
            vins = gold.vins,
            report_rows = report.rows,
            "pipeline finished"
        );
        Ok(PipelineSummary {
            run_id: run_id.clone(),
            ingest,
            sanitize,
            gold,
            report,
        })
    }
}
