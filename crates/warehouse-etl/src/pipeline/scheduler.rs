//! Scheduler contract.
//!
//! A job is a zero-argument unit of work run once per trigger. When a run
//! fails with a retryable error the whole run is repeated, up to the job's
//! retry count. Runs are full overwrites, so repeating one is safe.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Default schedule label.
pub const DAILY: &str = "@daily";

/// How a job is triggered and retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    /// Trigger label understood by the external scheduler (e.g. `@daily`).
    pub schedule: String,
    /// Extra attempts after a failed run.
    /// Default: 1
    pub retries: u32,
    /// Pause between attempts.
    /// Default: none
    pub retry_delay: Duration,
}

impl JobSpec {
    /// A daily job with one retry.
    pub fn daily(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schedule: DAILY.to_string(),
            retries: 1,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Run `job` for one trigger of `spec`.
///
/// Errors that are not [retryable](crate::error::EtlError::is_retryable)
/// (cancellation, bad configuration) end the run immediately. Otherwise the
/// last error is returned once every attempt has failed.
pub fn run_job<T, F>(spec: &JobSpec, mut job: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = spec.retries + 1;
    let mut attempt = 1;
    loop {
        info!("Job '{}' attempt {}/{}", spec.id, attempt, attempts);
        match job() {
            Ok(value) => {
                info!("Job '{}' succeeded on attempt {}", spec.id, attempt);
                return Ok(value);
            }
            Err(e) if !e.is_retryable() || attempt >= attempts => {
                warn!("Job '{}' failed on attempt {}: {}", spec.id, attempt, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Job '{}' failed on attempt {}, retrying: {}",
                    spec.id, attempt, e
                );
                if !spec.retry_delay.is_zero() {
                    std::thread::sleep(spec.retry_delay);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;

    #[test]
    fn test_daily_defaults() {
        let spec = JobSpec::daily("advanced_quality_check");
        assert_eq!(spec.schedule, "@daily");
        assert_eq!(spec.retries, 1);
        assert_eq!(spec.retry_delay, Duration::ZERO);
    }

    #[test]
    fn test_retry_then_succeed() {
        let mut calls = 0;
        let result = run_job(&JobSpec::daily("flaky"), || {
            calls += 1;
            if calls == 1 {
                Err(EtlError::write_failure("fact_orders_clean", "locked"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_retries_exhausted() {
        let mut calls = 0;
        let err = run_job(&JobSpec::daily("down").with_retries(2), || -> Result<()> {
            calls += 1;
            Err(EtlError::source_unavailable("fact_orders", "offline"))
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn test_cancellation_is_not_retried() {
        let mut calls = 0;
        let err = run_job(&JobSpec::daily("stopped").with_retries(5), || -> Result<()> {
            calls += 1;
            Err(EtlError::Cancelled)
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(err.is_cancelled());
    }
}
