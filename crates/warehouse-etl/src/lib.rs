//! Warehouse ETL Library
//!
//! Batch jobs over a tabular data warehouse, built with Rust and Polars.
//!
//! # Overview
//!
//! - **Customer pipeline**: extract raw customers, derive `full_name`, load
//!   them into the analytics schema
//! - **Quality pass**: flag anomalous order measures (z-score) and dangling
//!   customer/product references, impute them (median / sentinel `-1`), write
//!   the corrected orders and append an issue history
//! - **Dashboard**: query curated tables and emit chart specifications
//! - **Scheduler contract**: run a job once per trigger, retrying the whole run
//!   on retryable failures
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use warehouse_etl::{QualityConfig, QualityJob, WarehouseConfig};
//! use warehouse_etl::warehouse::with_session;
//!
//! // Connection comes from WAREHOUSE_DIR / WAREHOUSE_SCHEMA
//! let warehouse = WarehouseConfig::from_env()?;
//!
//! let config = QualityConfig::builder()
//!     .z_threshold(3.0)
//!     .build()?;
//!
//! let report = with_session(&warehouse, |wh| QualityJob::new(config).run(wh))?;
//! println!("{} anomalies, {} missing references", report.anomalies, report.missing_references);
//! ```
//!
//! # Warehouses
//!
//! Everything reads and writes through the [`warehouse::Warehouse`] trait:
//!
//! - [`warehouse::CsvWarehouse`] - a directory per schema, a CSV file per table
//! - [`warehouse::MemoryWarehouse`] - in-memory tables, for tests and embedding
//!
//! # Progress Reporting
//!
//! Pipelines and quality jobs report progress and honour a
//! [`CancellationToken`] up to their first write:
//!
//! ```rust,ignore
//! let token = CancellationToken::new();
//!
//! let result = QualityJob::new(config)
//!     .cancellation_token(token.clone())
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .run(&warehouse);
//!
//! match result {
//!     Ok(report) => println!("{} issue(s)", report.total_issues()),
//!     Err(e) if e.is_cancelled() => println!("Cancelled"),
//!     Err(e) => println!("Error: {}", e),
//! }
//! ```

pub mod config;
pub mod dashboard;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod reporting;
pub mod sample;
pub mod types;
pub mod utils;
pub mod warehouse;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, PipelineConfig, QualityConfig, QualityConfigBuilder, ReferenceCheck,
    WarehouseConfig,
};
pub use dashboard::{ChartKind, ChartSpec, DashboardDocument, Segment};
pub use error::{EtlError, Result as EtlResult, ResultExt};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, JobSpec, Pipeline, PipelineBuilder, PipelineRun,
    PipelineStep, ProgressReporter, ProgressUpdate, RunStage, customer_pipeline, run_job,
};
pub use quality::{ColumnStats, QualityJob, QualityScanner, ScanOutcome, run_quality_check};
pub use reporting::{QualityReport, ReportWriter};
pub use types::{
    IssueKind, PipelineRunSummary, QualityIssue, SkipReason, SkippedColumn, StepSummary,
};
pub use warehouse::{CsvWarehouse, MemoryWarehouse, Warehouse, WriteMode, with_session};
