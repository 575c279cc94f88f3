//! Sequential pipeline runner.
//!
//! A [`Pipeline`] is an explicit, ordered list of named [`PipelineStep`]s.
//! Each step receives the table produced by the previous one; the first step
//! receives an empty table.

use crate::error::{EtlError, Result};
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate,
};
use crate::pipeline::step::PipelineStep;
use crate::types::{PipelineRunSummary, StepSummary};
use chrono::Local;
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Table returned by the last step.
    pub output: DataFrame,
    pub summary: PipelineRunSummary,
}

/// A named, ordered list of steps.
///
/// # Example
///
/// ```rust,ignore
/// use warehouse_etl::pipeline::{ExtractCustomers, LoadCustomers, Pipeline, TransformCustomers};
///
/// let run = Pipeline::builder("customer_pipeline")
///     .step(ExtractCustomers::new(&raw, "raw_customers"))
///     .step(TransformCustomers::new("raw_customers"))
///     .step(LoadCustomers::new(&analytics, "customers_transformed", 5))
///     .on_progress(|update| println!("[{:.0}%] {}", update.progress * 100.0, update.message))
///     .build()?
///     .run()?;
/// ```
pub struct Pipeline<'a> {
    name: String,
    steps: Vec<Box<dyn PipelineStep + 'a>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

impl<'a> Pipeline<'a> {
    /// Create a new pipeline builder.
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<'a> {
        PipelineBuilder {
            name: name.into(),
            steps: Vec::new(),
            progress_reporter: None,
            cancellation_token: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order, starting from an empty table.
    ///
    /// # Errors
    ///
    /// The first failing step aborts the run; its error is returned with the
    /// step name as context. Returns [`EtlError::Cancelled`] if the token is
    /// cancelled between steps.
    pub fn run(&self) -> Result<PipelineRun> {
        match self.run_internal() {
            Ok(run) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Pipeline '{}' completed",
                    self.name
                )));
                Ok(run)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline '{}' failed: {}", self.name, e);
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

    fn run_internal(&self) -> Result<PipelineRun> {
        let start_time = Instant::now();
        let started_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        info!(
            "Starting pipeline '{}' ({} steps)",
            self.name,
            self.steps.len()
        );

        let total = self.steps.len();
        let mut table = DataFrame::empty();
        let mut steps = Vec::with_capacity(total);

        for (i, step) in self.steps.iter().enumerate() {
            self.check_cancelled()?;
            self.report_progress(ProgressUpdate::with_items(
                step.stage(),
                format!("Step: {}", step.name()),
                i,
                total,
                format!("Running {}", step.name()),
            ));

            let step_start = Instant::now();
            table = step
                .run(table)
                .map_err(|e| e.with_context(format!("Step '{}'", step.name())))?;

            let summary = StepSummary {
                name: step.name().to_string(),
                rows_out: table.height(),
                columns_out: table.width(),
                duration_ms: step_start.elapsed().as_millis() as u64,
            };
            info!(
                "Step '{}' produced {} row(s) x {} column(s) in {}ms",
                summary.name, summary.rows_out, summary.columns_out, summary.duration_ms
            );
            steps.push(summary);
        }

        Ok(PipelineRun {
            output: table,
            summary: PipelineRunSummary {
                pipeline: self.name.clone(),
                started_at,
                duration_ms: start_time.elapsed().as_millis() as u64,
                steps,
            },
        })
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder<'a> {
    name: String,
    steps: Vec<Box<dyn PipelineStep + 'a>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

impl<'a> PipelineBuilder<'a> {
    /// Append a step.
    pub fn step(mut self, step: impl PipelineStep + 'a) -> Self {
        self.steps.push(Box::new(step));
        self
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

    /// Set a cancellation token, checked before every step.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the pipeline has no steps or two steps share a name.
    pub fn build(self) -> Result<Pipeline<'a>> {
        if self.steps.is_empty() {
            return Err(EtlError::InvalidConfig(format!(
                "pipeline '{}' has no steps",
                self.name
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if self.steps[..i].iter().any(|s| s.name() == step.name()) {
                return Err(EtlError::InvalidConfig(format!(
                    "pipeline '{}' has two steps named '{}'",
                    self.name,
                    step.name()
                )));
            }
        }

        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::progress::RunStage;
    use crate::pipeline::step::FnStep;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn source() -> FnStep<impl Fn(DataFrame) -> Result<DataFrame>> {
        FnStep::new("source", RunStage::Reading, |_| {
            Ok(df!["n" => [1i64, 2, 3]]?)
        })
    }

    #[test]
    fn test_steps_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());

        let run = Pipeline::builder("ordered")
            .step(FnStep::new("first", RunStage::Reading, move |_| {
                o1.lock().push("first");
                Ok(df!["n" => [1i64, 2, 3]]?)
            }))
            .step(FnStep::new("second", RunStage::Transforming, move |df: DataFrame| {
                o2.lock().push("second");
                Ok(df.head(Some(2)))
            }))
            .build()
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert_eq!(run.output.height(), 2);
        assert_eq!(run.summary.steps.len(), 2);
        assert_eq!(run.summary.steps[0].rows_out, 3);
        assert_eq!(run.summary.pipeline, "ordered");
    }

    #[test]
    fn test_failing_step_stops_the_run() {
        let later = Arc::new(AtomicUsize::new(0));
        let later_clone = later.clone();

        let err = Pipeline::builder("failing")
            .step(source())
            .step(FnStep::new("broken", RunStage::Transforming, |_| {
                Err(EtlError::schema_mismatch("raw_customers", "first_name"))
            }))
            .step(FnStep::new("after", RunStage::Writing, move |df| {
                later_clone.fetch_add(1, Ordering::SeqCst);
                Ok(df)
            }))
            .build()
            .unwrap()
            .run()
            .unwrap_err();

        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(err.to_string().contains("Step 'broken'"));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_pipeline_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let err = Pipeline::builder("cancelled")
            .step(source())
            .cancellation_token(token)
            .build()
            .unwrap()
            .run()
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[test]
    fn test_progress_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        Pipeline::builder("progress")
            .step(source())
            .on_progress(move |_update| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap()
            .run()
            .unwrap();

        // One update for the step, one for completion
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_build_validation() {
        assert!(Pipeline::builder("empty").build().is_err());

        let err = Pipeline::builder("dupes")
            .step(source())
            .step(source())
            .build()
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_step_names() {
        let pipeline = Pipeline::builder("named").step(source()).build().unwrap();
        assert_eq!(pipeline.step_names(), vec!["source"]);
        assert_eq!(pipeline.name(), "named");
    }
}
