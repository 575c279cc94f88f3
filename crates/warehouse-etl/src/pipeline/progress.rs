//! Progress reporting and cancellation for pipeline and quality runs.
//!
//! Every run moves through the same three working stages: read its inputs,
//! compute (transform or scan), write its outputs. Reporters receive a
//! [`ProgressUpdate`] at each boundary; a [`CancellationToken`] can stop the
//! run at any boundary before the first write.
//!
//! # Example
//!
//! ```rust,ignore
//! use warehouse_etl::{CancellationToken, QualityJob};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! // From a signal handler or another thread
//! std::thread::spawn(move || token_clone.cancel());
//!
//! let report = QualityJob::new(config)
//!     .cancellation_token(token)
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .run(&warehouse);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Reading source tables from the warehouse
    Reading,
    /// Applying an in-memory transformation step
    Transforming,
    /// Scanning for anomalies and dangling references
    Scanning,
    /// Persisting results to the warehouse
    Writing,
    /// Run completed successfully
    Complete,
    /// Run was cancelled
    Cancelled,
    /// Run failed with an error
    Failed,
}

impl RunStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Reading => "Reading Sources",
            Self::Transforming => "Transforming",
            Self::Scanning => "Scanning Quality",
            Self::Writing => "Writing Outputs",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// `(start, end)` of this stage on the 0.0 - 1.0 scale of a whole run.
    ///
    /// `Transforming` and `Scanning` share a span: a run does one or the
    /// other. Terminal stages are points.
    pub fn span(&self) -> (f32, f32) {
        match self {
            Self::Reading => (0.0, 0.25),
            Self::Transforming | Self::Scanning => (0.25, 0.75),
            Self::Writing => (0.75, 1.0),
            Self::Complete => (1.0, 1.0),
            Self::Cancelled | Self::Failed => (0.0, 0.0),
        }
    }

    /// Position in the whole run after `stage_progress` of this stage.
    pub fn overall_progress(&self, stage_progress: f32) -> f32 {
        let (start, end) = self.span();
        (start + (end - start) * stage_progress).clamp(0.0, 1.0)
    }
}

/// Where a run is, reported at every stage boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: RunStage,

    /// What inside the stage is being worked on, e.g. "Table: dim_products"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Whole run, 0.0 - 1.0
    pub progress: f32,
    /// Current stage only, 0.0 - 1.0
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// An update `stage_progress` (0.0 - 1.0) of the way through `stage`.
    pub fn new(stage: RunStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        Self {
            stage,
            sub_stage: None,
            progress: stage.overall_progress(stage_progress),
            stage_progress,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// An update for item `current` of `total` (tables read, steps run...).
    pub fn with_items(
        stage: RunStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let fraction = match total {
            0 => 0.0,
            _ => current as f32 / total as f32,
        };
        Self {
            sub_stage: Some(sub_stage.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, fraction, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(RunStage::Complete, 1.0, message)
    }

    pub fn cancelled() -> Self {
        Self::new(RunStage::Cancelled, 0.0, "Run cancelled")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(RunStage::Failed, 0.0, message)
    }
}

/// Sink for [`ProgressUpdate`]s. Runs may be driven from a worker thread.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Adapts a closure into a [`ProgressReporter`].
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a run from another thread.
///
/// Runs check the token between stages and return
/// [`EtlError::Cancelled`](crate::error::EtlError::Cancelled). Once a run has
/// started writing it no longer checks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Visible to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancellation_token_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();
        assert!(!token2.is_cancelled());

        token1.cancel();
        assert!(token2.is_cancelled());

        token2.reset();
        assert!(!token1.is_cancelled());
    }

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new(RunStage::Scanning, 0.5, "Scanning...");
        assert_eq!(update.stage, RunStage::Scanning);
        assert!(update.sub_stage.is_none());
        assert_eq!(update.progress, 0.5);
        assert_eq!(update.stage_progress, 0.5);
    }

    #[test]
    fn test_progress_update_with_items() {
        let update = ProgressUpdate::with_items(RunStage::Writing, "Table: issues", 1, 2, "Writing");
        assert_eq!(update.sub_stage.as_deref(), Some("Table: issues"));
        assert_eq!(update.stage_progress, 0.5);
        assert_eq!(update.progress, 0.875);
        assert_eq!(update.items_total, Some(2));
    }

    #[test]
    fn test_progress_update_terminal_states() {
        assert_eq!(ProgressUpdate::complete("Done").progress, 1.0);
        assert_eq!(ProgressUpdate::cancelled().stage, RunStage::Cancelled);
        assert_eq!(ProgressUpdate::failed("boom").message, "boom");
    }

    #[test]
    fn test_stage_spans_are_contiguous() {
        for middle in [RunStage::Transforming, RunStage::Scanning] {
            assert_eq!(RunStage::Reading.span().1, middle.span().0);
            assert_eq!(middle.span().1, RunStage::Writing.span().0);
        }
        assert_eq!(RunStage::Writing.overall_progress(1.0), 1.0);
        assert_eq!(RunStage::Failed.overall_progress(0.7), 0.0);
    }

    #[test]
    fn test_stage_json_values() {
        assert_eq!(serde_json::to_string(&RunStage::Reading).unwrap(), "\"reading\"");
        assert_eq!(serde_json::to_string(&RunStage::Scanning).unwrap(), "\"scanning\"");
        assert_eq!(RunStage::Writing.display_name(), "Writing Outputs");
    }

    #[test]
    fn test_reporter_used_from_worker_thread() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let reporter: Arc<dyn ProgressReporter> =
            Arc::new(ClosureProgressReporter::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        let worker = Arc::clone(&reporter);
        std::thread::spawn(move || worker.report(ProgressUpdate::new(RunStage::Reading, 1.0, "read")))
            .join()
            .unwrap();
        reporter.report(ProgressUpdate::complete("Done"));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
