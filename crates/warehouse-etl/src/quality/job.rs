//! The quality job: read, scan, write.

use super::scanner::{QualityScanner, issues_frame};
use crate::config::QualityConfig;
use crate::error::{EtlError, Result, ResultExt};
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate, RunStage,
};
use crate::reporting::QualityReport;
use crate::warehouse::{Warehouse, WriteMode, select_all};
use polars::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// One run of the quality pass against a warehouse.
///
/// The fact table and every reference table are read, the whole
/// scan-and-correct pass runs in memory, and only then are outputs written:
/// the corrected table replaces the clean output, and the issues (if any) are
/// appended to the issue history as one batch.
///
/// # Example
///
/// ```rust,ignore
/// use warehouse_etl::{QualityConfig, QualityJob};
///
/// let report = QualityJob::new(QualityConfig::default())
///     .on_progress(|update| println!("[{:.0}%] {}", update.progress * 100.0, update.message))
///     .run(&warehouse)?;
/// println!("{} issue(s)", report.total_issues());
/// ```
pub struct QualityJob {
    scanner: QualityScanner,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

static_assertions::assert_impl_all!(QualityJob: Send);

impl QualityJob {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            scanner: QualityScanner::new(config),
            progress_reporter: None,
            cancellation_token: CancellationToken::default(),
        }
    }

    pub fn config(&self) -> &QualityConfig {
        self.scanner.config()
    }

    /// Set a progress reporter for receiving updates during the run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token. It is honoured up to the first write.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run the pass.
    ///
    /// # Errors
    ///
    /// - [`EtlError::InvalidConfig`] if the configuration does not validate
    /// - [`EtlError::SourceUnavailable`] / [`EtlError::SchemaMismatch`] while
    ///   reading; nothing has been written
    /// - [`EtlError::Cancelled`] if cancelled before writing
    /// - [`EtlError::WriteFailure`] if either output cannot be persisted
    pub fn run(&self, warehouse: &dyn Warehouse) -> Result<QualityReport> {
        match self.run_internal(warehouse) {
            Ok(report) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Quality check finished with {} issue(s)",
                    report.total_issues()
                )));
                Ok(report)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Quality check failed: {}", e);
                Err(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(EtlError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, warehouse: &dyn Warehouse) -> Result<QualityReport> {
        let start_time = Instant::now();
        let config = self.config();
        config.validate()?;

        info!("Starting quality check on {}", config.fact_table);
        self.report_progress(ProgressUpdate::new(
            RunStage::Reading,
            0.0,
            format!("Reading {}", config.fact_table),
        ));
        let fact = select_all(warehouse, &config.fact_table).context("Reading fact table")?;

        let mut references = HashMap::new();
        for (i, check) in config.reference_checks.iter().enumerate() {
            self.check_cancelled()?;
            self.report_progress(ProgressUpdate::with_items(
                RunStage::Reading,
                format!("Table: {}", check.reference_table),
                i,
                config.reference_checks.len(),
                format!("Reading {}", check.reference_table),
            ));
            if references.contains_key(&check.reference_table) {
                continue;
            }
            let table = select_all(warehouse, &check.reference_table)
                .context("Reading reference table")?;
            references.insert(check.reference_table.clone(), table);
        }
        info!(
            "Loaded {} order(s) and {} reference table(s)",
            fact.height(),
            references.len()
        );

        self.check_cancelled()?;
        self.report_progress(ProgressUpdate::new(
            RunStage::Scanning,
            0.0,
            format!("Scanning {} row(s)", fact.height()),
        ));
        let outcome = self.scanner.scan(&fact, &references)?;

        self.check_cancelled()?;
        let mut outputs: Vec<(&str, DataFrame, WriteMode)> =
            vec![(config.clean_table.as_str(), outcome.table.clone(), WriteMode::Overwrite)];
        if outcome.issues.is_empty() {
            info!("No issues found, issue history left unchanged");
        } else {
            outputs.push((
                config.issue_table.as_str(),
                issues_frame(&outcome.issues)?,
                WriteMode::Append,
            ));
        }

        let mut tables_written = Vec::with_capacity(outputs.len());
        let total = outputs.len();
        for (i, (destination, table, mode)) in outputs.into_iter().enumerate() {
            self.report_progress(ProgressUpdate::with_items(
                RunStage::Writing,
                format!("Table: {}", destination),
                i,
                total,
                format!("Writing {} row(s) to {}", table.height(), destination),
            ));
            warehouse.write(&table, destination, mode)?;
            tables_written.push(destination.to_string());
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Quality check complete: {} issue(s) in {}ms",
            outcome.issues.len(),
            duration_ms
        );

        Ok(QualityReport::from_outcome(
            &config.fact_table,
            &outcome,
            tables_written,
            duration_ms,
        ))
    }
}

/// Run the quality pass with `config` and no progress reporting.
pub fn run_quality_check(
    warehouse: &dyn Warehouse,
    config: &QualityConfig,
) -> Result<QualityReport> {
    QualityJob::new(config.clone()).run(warehouse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;
    use parking_lot::Mutex;

    fn warehouse() -> MemoryWarehouse {
        MemoryWarehouse::new()
            .with_table(
                "fact_orders",
                df![
                    "order_id" => [1i64, 2, 3],
                    "customer_id" => [1i64, 999, 2],
                    "product_id" => [10i64, 10, 10],
                ]
                .unwrap(),
            )
            .with_table("dim_customers", df!["customer_id" => [1i64, 2]].unwrap())
            .with_table("dim_products", df!["product_id" => [10i64]].unwrap())
    }

    #[test]
    fn test_run_writes_clean_then_issues() {
        let wh = warehouse();
        let report = run_quality_check(&wh, &QualityConfig::default()).unwrap();

        assert_eq!(report.missing_references, 1);
        assert_eq!(
            report.tables_written,
            vec!["fact_orders_clean", "data_quality_issues"]
        );
        let writes = wh.writes();
        assert_eq!(writes[0].mode, WriteMode::Overwrite);
        assert_eq!(writes[1].mode, WriteMode::Append);
        assert_eq!(writes[1].rows, 1);
    }

    #[test]
    fn test_cancelled_before_writing() {
        let wh = warehouse();
        let token = CancellationToken::new();
        token.cancel();

        let err = QualityJob::new(QualityConfig::default())
            .cancellation_token(token)
            .run(&wh)
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(wh.writes().is_empty());
    }

    #[test]
    fn test_progress_reaches_complete() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let stages_clone = stages.clone();

        QualityJob::new(QualityConfig::default())
            .on_progress(move |update| stages_clone.lock().push(update.stage))
            .run(&warehouse())
            .unwrap();

        let stages = stages.lock();
        assert_eq!(stages.first(), Some(&RunStage::Reading));
        assert!(stages.contains(&RunStage::Scanning));
        assert!(stages.contains(&RunStage::Writing));
        assert_eq!(stages.last(), Some(&RunStage::Complete));
    }

    #[test]
    fn test_invalid_config_fails_before_reading() {
        let mut config = QualityConfig::default();
        config.z_threshold = -1.0;
        let err = run_quality_check(&MemoryWarehouse::new(), &config).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
