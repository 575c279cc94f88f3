//! CLI entry point for the warehouse jobs.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use warehouse_etl::sample::{SampleOptions, SeedSummary, seed_warehouse};
use warehouse_etl::{
    DashboardDocument, JobSpec, PipelineConfig, PipelineRunSummary, QualityConfig, QualityJob,
    QualityReport, ReportWriter, WarehouseConfig, customer_pipeline, run_job, with_session,
};

/// CLI-compatible log level enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl CliLogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Warehouse ETL jobs: customer pipeline, order quality pass, sales dashboard",
    long_about = "Batch jobs over a directory-backed tabular warehouse.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  WAREHOUSE_DIR       Warehouse root (used when --warehouse-dir is not given)\n  \
                  WAREHOUSE_SCHEMA    Default schema (ANALYTICS when unset)\n\n\
                  EXAMPLES:\n  \
                  # Create a sample warehouse\n  \
                  warehouse-etl --warehouse-dir ./wh seed\n\n  \
                  # Run the quality pass with a stricter threshold\n  \
                  warehouse-etl --warehouse-dir ./wh quality-check --z-threshold 2.5\n\n  \
                  # Emit the dashboard document\n  \
                  warehouse-etl --warehouse-dir ./wh dashboard -o dashboard.json"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Warehouse root directory
    ///
    /// Falls back to the WAREHOUSE_DIR environment variable
    #[arg(short, long, global = true)]
    warehouse_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, global = true, value_enum, default_value = "info")]
    log_level: CliLogLevel,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON result.
    #[arg(long, global = true)]
    json: bool,

    /// Extra attempts when a job fails with a retryable error
    #[arg(long, global = true, default_value = "1")]
    retries: u32,

    /// Seconds to wait between attempts
    #[arg(long, global = true, default_value = "0")]
    retry_delay_secs: u64,

    /// Write a detailed JSON report to the report directory
    #[arg(short = 'r', long, global = true)]
    emit_report: bool,

    /// Directory for --emit-report files
    #[arg(long, global = true, default_value = "./reports")]
    report_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a deterministic sample warehouse (RAW and ANALYTICS schemas)
    Seed {
        #[arg(long, default_value = "42")]
        seed: u64,
        #[arg(long, default_value = "20")]
        customers: usize,
        #[arg(long, default_value = "200")]
        orders: usize,
    },
    /// Extract raw customers, derive full names, load them into ANALYTICS
    CustomerPipeline {
        #[arg(long, default_value = "RAW")]
        raw_schema: String,
        #[arg(long, default_value = "ANALYTICS")]
        analytics_schema: String,
    },
    /// Flag and correct anomalous orders, then write the clean table and issues
    QualityCheck {
        /// JSON quality configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the z-score threshold
        #[arg(long)]
        z_threshold: Option<f64>,
        #[arg(long, default_value = "ANALYTICS")]
        schema: String,
    },
    /// Build the sales dashboard document
    Dashboard {
        /// Output file (printed to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "ANALYTICS")]
        schema: String,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.log_level.as_str(), args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();

    let warehouse = resolve_warehouse(&args)?;
    debug!("Warehouse root: {}", warehouse.root_dir.display());

    match &args.command {
        Command::Seed {
            seed,
            customers,
            orders,
        } => run_seed(&args, &warehouse, *seed, *customers, *orders),
        Command::CustomerPipeline {
            raw_schema,
            analytics_schema,
        } => run_customer_pipeline(&args, &warehouse, raw_schema, analytics_schema),
        Command::QualityCheck {
            config,
            z_threshold,
            schema,
        } => run_quality_check(&args, &warehouse.with_schema(schema), config, *z_threshold),
        Command::Dashboard { output, schema } => {
            run_dashboard(&args, &warehouse.with_schema(schema), output)
        }
    }
}

fn resolve_warehouse(args: &Args) -> Result<WarehouseConfig> {
    match &args.warehouse_dir {
        Some(dir) => Ok(WarehouseConfig::new(dir, "ANALYTICS")),
        None => WarehouseConfig::from_env()
            .map_err(|e| anyhow!("{} (pass --warehouse-dir or set it)", e)),
    }
}

fn job_spec(args: &Args, id: &str) -> JobSpec {
    JobSpec::daily(id)
        .with_retries(args.retries)
        .with_retry_delay(Duration::from_secs(args.retry_delay_secs))
}

// ============================================================================
// Commands
// ============================================================================

fn run_seed(
    args: &Args,
    warehouse: &WarehouseConfig,
    seed: u64,
    customers: usize,
    orders: usize,
) -> Result<()> {
    let options = SampleOptions {
        seed,
        customers,
        orders,
    };
    let summary = seed_warehouse(warehouse, options).context("Seeding warehouse failed")?;

    handle_output(args, &summary, "seed", print_seed_summary)
}

fn run_customer_pipeline(
    args: &Args,
    warehouse: &WarehouseConfig,
    raw_schema: &str,
    analytics_schema: &str,
) -> Result<()> {
    let config = PipelineConfig {
        raw_schema: raw_schema.to_string(),
        analytics_schema: analytics_schema.to_string(),
        ..PipelineConfig::default()
    };
    let raw = warehouse.with_schema(&config.raw_schema);
    let analytics = warehouse.with_schema(&config.analytics_schema);

    let summary = run_job(&job_spec(args, "customer_pipeline"), || {
        with_session(&raw, |source| {
            with_session(&analytics, |target| {
                customer_pipeline(source, target, &config)?
                    .run()
                    .map(|run| run.summary)
            })
        })
    })
    .context("Customer pipeline failed")?;

    handle_output(args, &summary, "customer_pipeline", print_pipeline_summary)
}

fn run_quality_check(
    args: &Args,
    warehouse: &WarehouseConfig,
    config_path: &Option<PathBuf>,
    z_threshold: Option<f64>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => QualityConfig::from_json_file(path)?,
        None => QualityConfig::default(),
    };
    if let Some(threshold) = z_threshold {
        config.z_threshold = threshold;
        config.validate()?;
    }

    let report = run_job(&job_spec(args, "advanced_quality_check"), || {
        with_session(warehouse, |wh| {
            QualityJob::new(config.clone())
                .on_progress(|update| {
                    debug!(
                        "[{:>3.0}%] {}: {}",
                        update.progress * 100.0,
                        update.stage.display_name(),
                        update.message
                    )
                })
                .run(wh)
        })
    })
    .context("Quality check failed")?;

    handle_output(args, &report, "quality_check", print_quality_summary)
}

fn run_dashboard(
    args: &Args,
    warehouse: &WarehouseConfig,
    output: &Option<PathBuf>,
) -> Result<()> {
    let document = with_session(warehouse, |wh| DashboardDocument::build(wh))
        .context("Building dashboard failed")?;

    match output {
        Some(path) => {
            document.write_to_file(path)?;
            if !args.json {
                println!("Dashboard written to {}", path.display());
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&document)?),
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

/// Print `--json` output or the human-readable summary, and emit a report
/// file when requested.
fn handle_output<T: Serialize>(
    args: &Args,
    value: &T,
    report_name: &str,
    print_summary: fn(&T),
) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print_summary(value);
    }

    if args.emit_report {
        let path = ReportWriter::new(&args.report_dir).write_report_to_file(value, report_name)?;
        if !args.json {
            info!("Report written to {}", path.display());
        }
    }
    Ok(())
}

/// Note: uses `println!` intentionally; this is the command's result, not a
/// log line.
fn print_quality_summary(report: &QualityReport) {
    println!("\n{}", "=".repeat(80));
    println!("DATA QUALITY CHECK COMPLETE");
    println!("{}\n", "=".repeat(80));

    println!("  Fact table:          {}", report.fact_table);
    println!("  Rows scanned:        {}", report.rows_scanned);
    println!("  Anomalies:           {}", report.anomalies);
    println!("  Missing references:  {}", report.missing_references);
    println!("  Duration:            {} ms", report.duration_ms);
    println!();

    if !report.column_stats.is_empty() {
        println!("MEASURE STATISTICS");
        println!("{}", "-".repeat(40));
        println!(
            "{:<16} {:>8} {:>12} {:>12} {:>12}",
            "Column", "Count", "Mean", "Std", "Median"
        );
        for (column, stats) in &report.column_stats {
            println!(
                "{:<16} {:>8} {:>12.2} {:>12.2} {:>12.2}",
                column, stats.count, stats.mean, stats.std_dev, stats.median
            );
        }
        println!();
    }

    if !report.skipped_columns.is_empty() {
        println!("SKIPPED COLUMNS");
        println!("{}", "-".repeat(40));
        for skipped in &report.skipped_columns {
            println!("  - {}: {:?}", skipped.column, skipped.reason);
        }
        println!();
    }

    println!("ISSUES");
    println!("{}", "-".repeat(40));
    if report.issues.is_empty() {
        println!("  No issues found");
    } else {
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }
    println!();

    println!("  Tables written: {}", report.tables_written.join(", "));
    println!("{}\n", "=".repeat(80));
}

fn print_pipeline_summary(summary: &PipelineRunSummary) {
    println!("\n{}", "=".repeat(80));
    println!("PIPELINE '{}' COMPLETE", summary.pipeline);
    println!("{}\n", "=".repeat(80));

    println!("{:<24} {:>10} {:>10} {:>12}", "Step", "Rows", "Columns", "Duration");
    println!("{}", "-".repeat(60));
    for step in &summary.steps {
        println!(
            "{:<24} {:>10} {:>10} {:>9} ms",
            step.name, step.rows_out, step.columns_out, step.duration_ms
        );
    }
    println!();
    println!("  Started:  {}", summary.started_at);
    println!("  Duration: {} ms", summary.duration_ms);
    println!("{}\n", "=".repeat(80));
}

fn print_seed_summary(summary: &SeedSummary) {
    println!("\n{}", "=".repeat(80));
    println!("SAMPLE WAREHOUSE SEEDED (seed {})", summary.seed);
    println!("{}\n", "=".repeat(80));

    for (table, rows) in &summary.tables {
        println!("  {:<40} {:>8} rows", table, rows);
    }
    println!();
}
