use crate::quality::{ColumnStats, ScanOutcome};
use crate::types::{IssueKind, QualityIssue, SkippedColumn};
use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// Report Types
// ============================================================================

/// Everything a quality run did, for the CLI summary, `--json` output and
/// `--emit-report` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    pub fact_table: String,
    pub rows_scanned: usize,
    pub anomalies: usize,
    pub missing_references: usize,
    /// Measure columns that were configured but not scanned, with the reason
    pub skipped_columns: Vec<SkippedColumn>,
    /// Statistics of every scanned measure column
    pub column_stats: BTreeMap<String, ColumnStats>,
    pub issues: Vec<QualityIssue>,
    /// Destinations written, in write order
    pub tables_written: Vec<String>,
    pub duration_ms: u64,
}

impl QualityReport {
    pub fn from_outcome(
        fact_table: &str,
        outcome: &ScanOutcome,
        tables_written: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        let count = |kind: IssueKind| outcome.issues.iter().filter(|i| i.kind == kind).count();
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            fact_table: fact_table.to_string(),
            rows_scanned: outcome.table.height(),
            anomalies: count(IssueKind::Anomaly),
            missing_references: count(IssueKind::MissingReference),
            skipped_columns: outcome.skipped_columns.clone(),
            column_stats: outcome.column_stats.clone(),
            issues: outcome.issues.clone(),
            tables_written,
            duration_ms,
        }
    }

    pub fn total_issues(&self) -> usize {
        self.issues.len()
    }
}

// ============================================================================
// Report Writer
// ============================================================================

/// Writes serializable reports as pretty JSON files.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./reports"),
        }
    }
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write a report to `<output_dir>/<report_base_name>_report.json`.
    pub fn write_report_to_file<T: Serialize>(
        &self,
        report: &T,
        report_base_name: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let report_path = self
            .output_dir
            .join(format!("{}_report.json", report_base_name));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());

        Ok(report_path)
    }
}
