//! Run reports.
//!
//! [`QualityReport`] and [`PipelineRunSummary`](crate::types::PipelineRunSummary)
//! are serializable and used for:
//! - JSON output to stdout (`--json` CLI flag)
//! - JSON file output (`--emit-report` CLI flag)
//! - Programmatic access in library mode
//!
//! # Example
//!
//! ```rust,ignore
//! use warehouse_etl::reporting::ReportWriter;
//!
//! let report = QualityJob::new(config).run(&warehouse)?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//!
//! ReportWriter::new("reports").write_report_to_file(&report, "quality")?;
//! ```

mod generator;

pub use generator::{QualityReport, ReportWriter};
