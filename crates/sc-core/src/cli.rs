//! Command-line interface.
//!
//! Every command resolves configuration, opens the file store under the data
//! directory and prints either a human summary or a JSON envelope on stdout.
//! The process exit code carries the outcome class.

use crate::aggregate::load_pivot;
use crate::exit_codes::ExitCode;
use crate::ledger::latest_positions;
use crate::logging::{init_logging, LogSettings};
use crate::pipeline::{CycleReport, Pipeline, StageStatus};
use crate::reference::latest_snapshot;
use crate::store::{FileStore, Store, TableCounts};
use chrono::{NaiveDateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use sc_common::{
    DailySummary, Field, IngestionCheckpoint, OutputFormat, ReferenceStatistic, WindowLabel,
    SCHEMA_VERSION,
};
use sc_config::{
    resolve_config, ConfigPaths, ConfigSource, LogFormat, PipelineConfig, ResolvedConfig,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Incremental sensor data cleaning engine
#[derive(Parser, Debug)]
#[command(name = "sc-core", version)]
pub struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the directory holding the persisted tables
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output format for command results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Log encoding (overrides the configured one)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Human,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Human => LogFormat::Human,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply new rows from source batches
    Ingest {
        /// Apply these files instead of scanning the source directory.
        /// Explicit files are not archived.
        files: Vec<PathBuf>,
    },
    /// Detect outliers, refresh reference statistics and extend the clean dataset
    Clean,
    /// Refresh period stats and rebuild the daily outlier pivot
    Summarize,
    /// Ingest, clean and summarize in one run
    Run,
    /// Show ledger positions and table sizes
    Status,
    /// Show the newest reference statistics
    Stats {
        /// Only this window (full, last_4w, last_2w, last_1w, last_1d)
        #[arg(long, value_parser = parse_window)]
        window: Option<WindowLabel>,
    },
    /// Show the daily outlier pivot
    Pivot,
    /// Configuration commands
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration and where it came from
    Show,
}

fn parse_window(s: &str) -> Result<WindowLabel, String> {
    WindowLabel::parse(s).ok_or_else(|| format!("unknown window '{}'", s))
}

/// JSON output wrapper shared by every command.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    generated_at: String,
    result: T,
}

fn print_json<T: Serialize>(command: &str, result: T) {
    let envelope = Envelope {
        schema_version: SCHEMA_VERSION,
        command,
        generated_at: Utc::now().to_rfc3339(),
        result,
    };
    match serde_json::to_string_pretty(&envelope) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error: cannot encode output: {}", e),
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u32,
    message: String,
}

#[derive(Serialize)]
struct ErrorView {
    error: ErrorBody,
}

fn fail(format: OutputFormat, command: &str, err: sc_common::Error) -> ExitCode {
    let exit = ExitCode::for_error(&err);
    match format {
        OutputFormat::Json => print_json(
            command,
            ErrorView {
                error: ErrorBody {
                    code: err.code(),
                    message: err.to_string(),
                },
            },
        ),
        OutputFormat::Human => eprintln!("Error: {}", err),
    }
    exit
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest { .. } => "ingest",
            Commands::Clean => "clean",
            Commands::Summarize => "summarize",
            Commands::Run => "run",
            Commands::Status => "status",
            Commands::Stats { .. } => "stats",
            Commands::Pivot => "pivot",
            Commands::Config(_) => "config",
        }
    }
}

/// Execute a parsed command line.
pub fn run(cli: Cli) -> ExitCode {
    let command = cli.command.name();
    let paths = ConfigPaths {
        config_file: cli.config.clone(),
        data_dir: cli.data_dir.clone(),
    };
    let resolved = match resolve_config(&paths) {
        Ok(resolved) => resolved,
        Err(e) => return fail(cli.format, command, e.into()),
    };

    let settings = LogSettings::from_config(
        &resolved.config.logging,
        cli.log_format.map(LogFormat::from),
        cli.verbose,
    );
    if let Err(e) = init_logging(&settings) {
        eprintln!("Warning: {}", e);
    }

    if let Commands::Config(args) = &cli.command {
        return match args.command {
            ConfigCommands::Show => run_config_show(cli.format, &resolved),
        };
    }

    let config = resolved.config.clone();
    let store = match FileStore::open(&config.data_dir, &config.tables) {
        Ok(store) => store,
        Err(e) => return fail(cli.format, command, e.into()),
    };
    let mut pipeline = Pipeline::new(config, store);

    match &cli.command {
        Commands::Ingest { files } if files.is_empty() => {
            finish_cycle(cli.format, command, pipeline.ingest())
        }
        Commands::Ingest { files } => {
            finish_cycle(cli.format, command, pipeline.ingest_files(files))
        }
        Commands::Clean => finish_cycle(cli.format, command, pipeline.run_cleaning_cycle()),
        Commands::Summarize => finish_cycle(cli.format, command, pipeline.run_summary_cycle()),
        Commands::Run => finish_cycle(cli.format, command, pipeline.run_all()),
        Commands::Status => run_status(cli.format, &resolved, pipeline.store()),
        Commands::Stats { window } => run_stats(cli.format, pipeline.store(), *window),
        Commands::Pivot => run_pivot(cli.format, pipeline.store()),
        Commands::Config(_) => ExitCode::InternalError,
    }
}

fn finish_cycle(format: OutputFormat, command: &str, report: CycleReport) -> ExitCode {
    match format {
        OutputFormat::Json => print_json(command, &report),
        OutputFormat::Human => print_cycle(&report),
    }
    ExitCode::for_report(&report)
}

fn print_cycle(report: &CycleReport) {
    println!("# Run {}", report.run_id);
    println!();
    for stage in &report.stages {
        let status = match stage.status {
            StageStatus::Completed => "completed",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "FAILED",
        };
        let note = match stage.status {
            StageStatus::Completed => stage.detail.as_ref().map(scalar_fields).unwrap_or_default(),
            StageStatus::Skipped => stage
                .skip_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            StageStatus::Failed => stage.error.clone().unwrap_or_default(),
        };
        println!(
            "  {:<22} {:<10} {:>6} ms  {}",
            stage.stage.to_string(),
            status,
            stage.duration_ms,
            note
        );
    }
    if !report.success {
        println!();
        println!("Downstream stages were not run.");
    }
}

/// `key=value` for the top-level scalar members of a stage detail.
fn scalar_fields(detail: &serde_json::Value) -> String {
    let Some(map) = detail.as_object() else {
        return String::new();
    };
    map.iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Number(n) => Some(format!("{}={}", k, n)),
            serde_json::Value::String(s) => Some(format!("{}={}", k, s)),
            serde_json::Value::Array(items) => Some(format!("{}={}", k, items.len())),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Serialize)]
struct StatusView<'a> {
    config_source: &'a ConfigSource,
    data_dir: &'a std::path::Path,
    tables: TableCounts,
    sources: Vec<IngestionCheckpoint>,
    max_raw_timestamp: Option<NaiveDateTime>,
    max_clean_timestamp: Option<NaiveDateTime>,
}

fn status_view<'a>(
    resolved: &'a ResolvedConfig,
    store: &'a FileStore,
) -> Result<StatusView<'a>, crate::store::StoreError> {
    Ok(StatusView {
        config_source: &resolved.source,
        data_dir: store.dir(),
        tables: store.table_counts()?,
        sources: latest_positions(store)?,
        max_raw_timestamp: store.max_raw_timestamp()?,
        max_clean_timestamp: store.max_clean_timestamp()?,
    })
}

fn run_status(format: OutputFormat, resolved: &ResolvedConfig, store: &FileStore) -> ExitCode {
    let view = match status_view(resolved, store) {
        Ok(view) => view,
        Err(e) => return fail(format, "status", e.into()),
    };
    match format {
        OutputFormat::Json => print_json("status", &view),
        OutputFormat::Human => print_status(&resolved.config, &view),
    }
    ExitCode::Clean
}

fn print_status(config: &PipelineConfig, view: &StatusView<'_>) {
    let names = &config.tables;
    let counts = &view.tables;
    println!("# Store: {}", view.data_dir.display());
    println!();
    for (name, count) in [
        (&names.raw, counts.raw),
        (&names.ledger, counts.ledger),
        (&names.outliers, counts.outliers),
        (&names.reference_statistics, counts.reference_statistics),
        (&names.clean, counts.clean),
        (&names.period_stats, counts.period_stats),
        (&names.daily_outlier_counts, counts.daily_outlier_counts),
    ] {
        println!("  {:<28} {:>8}", name, count);
    }
    let show = |ts: Option<NaiveDateTime>| ts.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
    println!();
    println!("  newest raw reading:   {}", show(view.max_raw_timestamp));
    println!("  newest clean reading: {}", show(view.max_clean_timestamp));
    println!();
    println!("# Sources ({})", view.sources.len());
    for c in &view.sources {
        println!(
            "  {:<32} offset {:>8}  last {}  recorded {}",
            c.source_name,
            c.last_offset,
            c.last_timestamp,
            c.recorded_at.to_rfc3339()
        );
    }
}

fn run_stats(format: OutputFormat, store: &FileStore, window: Option<WindowLabel>) -> ExitCode {
    let stats = match store.reference_statistics() {
        Ok(stats) => stats,
        Err(e) => return fail(format, "stats", e.into()),
    };
    let mut snapshot = latest_snapshot(&stats);
    if let Some(w) = window {
        snapshot.retain(|label, _| *label == w);
    }
    match format {
        OutputFormat::Json => print_json("stats", &snapshot),
        OutputFormat::Human => print_stats(&snapshot),
    }
    ExitCode::Clean
}

fn print_stats(snapshot: &BTreeMap<WindowLabel, BTreeMap<Field, ReferenceStatistic>>) {
    if snapshot.is_empty() {
        println!("No reference statistics yet.");
        return;
    }
    let cell = |v: Option<f64>| v.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into());
    for (window, fields) in snapshot {
        println!("# Window {}", window);
        for (field, s) in fields {
            println!(
                "  {:<16} mean {:>12}  median {:>12}  mode {:>12}  ({})",
                field.column(),
                cell(s.mean),
                cell(s.median),
                cell(s.mode),
                s.computed_at.to_rfc3339()
            );
        }
        println!();
    }
}

#[derive(Serialize)]
struct PivotView {
    columns: Vec<String>,
    rows: Vec<DailySummary>,
}

fn run_pivot(format: OutputFormat, store: &FileStore) -> ExitCode {
    let pivot = match load_pivot(store) {
        Ok(pivot) => pivot,
        Err(e) => return fail(format, "pivot", e.into()),
    };
    let view = PivotView {
        columns: pivot.column_names(),
        rows: pivot.summaries(),
    };
    match format {
        OutputFormat::Json => print_json("pivot", &view),
        OutputFormat::Human => {
            if view.rows.is_empty() {
                println!("No daily outlier counts yet.");
                return ExitCode::Clean;
            }
            print!("{:<12}", "day");
            for c in &view.columns {
                print!(" {:>12}", c);
            }
            println!();
            for row in &view.rows {
                print!("{:<12}", row.day.to_string());
                for count in row.per_device_outlier_count.values() {
                    print!(" {:>12}", count);
                }
                println!();
            }
        }
    }
    ExitCode::Clean
}

#[derive(Serialize)]
struct ConfigView<'a> {
    source: &'a ConfigSource,
    config: &'a PipelineConfig,
}

fn run_config_show(format: OutputFormat, resolved: &ResolvedConfig) -> ExitCode {
    match format {
        OutputFormat::Json => print_json(
            "config",
            ConfigView {
                source: &resolved.source,
                config: &resolved.config,
            },
        ),
        OutputFormat::Human => match toml::to_string_pretty(&resolved.config) {
            Ok(text) => {
                println!("# source: {:?}", resolved.source);
                println!("{}", text);
            }
            Err(e) => {
                eprintln!("Error: cannot render configuration: {}", e);
                return ExitCode::InternalError;
            }
        },
    }
    ExitCode::Clean
}
