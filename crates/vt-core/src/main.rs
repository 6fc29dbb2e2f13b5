//! vt-core: vehicle telemetry pipeline CLI.
//!
//! Every subcommand prints a JSON summary on stdout; logs go to stderr.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode as ProcessExitCode;
use tracing::{error, info, info_span};
use vt_common::{Error, Result, RunId};
use vt_config::{resolve_config, ConfigPaths, PipelineConfig};
use vt_core::exit_codes::ExitCode;
use vt_core::ingest::{HttpSource, MessageSource, StaticSource};
use vt_core::logging::{init_logging, LogFormat};
use vt_core::pipeline::{Pipeline, DEFAULT_PROBE_PAYLOAD};
use vt_store::ParquetStore;

#[derive(Parser, Debug)]
#[command(name = "vt-core")]
#[command(version, about = "Vehicle telemetry bronze/silver/gold pipeline", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/vehicle-telemetry/config.toml)
    #[arg(long, global = true, env = "VT_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory holding the datasets (overrides config and VT_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch upstream messages and append them to bronze
    Ingest(IngestArgs),
    /// Rebuild silver partitions from bronze
    Sanitize,
    /// Rebuild the gold last-state table from silver
    Gold,
    /// Write the top-speed per hour report from silver
    Report,
    /// Scan a dataset for SQL-injection payloads
    Scan {
        /// Dataset to scan (default: the injected dataset)
        #[arg(long)]
        dataset: Option<String>,
    },
    /// Copy bronze into the injected dataset with one probe row
    SimulateInjection {
        #[arg(long, default_value = "vin")]
        column: String,
        #[arg(long, default_value = DEFAULT_PROBE_PAYLOAD)]
        payload: String,
    },
    /// Ingest, sanitize, gold, report
    Run(IngestArgs),
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Read messages from a JSON array file instead of the upstream API
    #[arg(long)]
    input: Option<PathBuf>,
}

fn load_config(global: &GlobalOpts) -> Result<PipelineConfig> {
    let mut config = resolve_config(&ConfigPaths::discover(global.config.clone()))?;
    if let Some(dir) = &global.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

fn read_input(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(records) => Ok(records),
        _ => Err(Error::InvalidPayload(format!(
            "{} does not hold a JSON array",
            path.display()
        ))),
    }
}

fn source_for(args: &IngestArgs, config: &PipelineConfig) -> Result<Box<dyn MessageSource>> {
    let source: Box<dyn MessageSource> = match &args.input {
        Some(path) => Box::new(StaticSource::new(read_input(path)?)),
        None => Box::new(HttpSource::from_config(&config.ingest)),
    };
    Ok(source)
}

fn emit<T: Serialize>(summary: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn execute(cli: &Cli, run_id: &RunId) -> Result<()> {
    let config = load_config(&cli.global)?;
    let store = ParquetStore::new(&config.storage.data_dir);
    let pipeline = Pipeline::new(&store, &config);
    info!(data_dir = %config.storage.data_dir.display(), "datasets root");

    match &cli.command {
        Commands::Ingest(args) => emit(&pipeline.ingest(source_for(args, &config)?.as_ref())?),
        Commands::Sanitize => emit(&pipeline.sanitize()?),
        Commands::Gold => emit(&pipeline.gold()?),
        Commands::Report => emit(&pipeline.report()?),
        Commands::Scan { dataset } => emit(&pipeline.scan(dataset.as_deref())?),
        Commands::SimulateInjection { column, payload } => {
            emit(&pipeline.simulate_injection(column, payload)?)
        }
        Commands::Run(args) => {
            emit(&pipeline.run_all(run_id, source_for(args, &config)?.as_ref())?)
        }
    }
}

fn main() -> ProcessExitCode {
    let dotenv_path = dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.global.log_format, cli.global.verbose);
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let run_id = RunId::new();
    let span = info_span!("run", run_id = %run_id);
    let _guard = span.enter();

    match execute(&cli, &run_id) {
        Ok(()) => ExitCode::Clean.into(),
        Err(err) => {
            let code = ExitCode::for_error(&err);
            error!(
                error = %err,
                error_code = err.code(),
                config_defect = err.is_config_defect(),
                exit_code = code.as_i32(),
                "run failed"
            );
            eprintln!("vt-core: {err}");
            code.into()
        }
    }
}
