//! Data quality pass over the orders fact table.
//!
//! [`QualityScanner`] finds anomalous measures (z-score above a threshold) and
//! foreign keys with no matching reference row, corrects them in memory, and
//! records one [`QualityIssue`](crate::types::QualityIssue) per correction.
//! [`QualityJob`] wraps the scanner with warehouse reads and writes.

mod job;
mod scanner;
pub mod stats;

pub use job::{QualityJob, run_quality_check};
pub use scanner::{ISSUE_DESCRIPTION_COLUMN, QualityScanner, ScanOutcome, issues_frame, scan};
pub use stats::ColumnStats;
