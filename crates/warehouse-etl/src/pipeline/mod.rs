//! Pipeline module.
//!
//! Sequential step runner, the customer extract/transform/load pipeline, the
//! scheduler contract, and progress/cancellation support shared with the
//! quality job.

mod builder;
pub mod customers;
pub mod progress;
pub mod scheduler;
mod step;

pub use builder::{Pipeline, PipelineBuilder, PipelineRun};
pub use customers::{
    ExtractCustomers, LoadCustomers, TransformCustomers, customer_pipeline, transform_customers,
};
pub use progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate, RunStage,
};
pub use scheduler::{JobSpec, run_job};
pub use step::{FnStep, PipelineStep};
