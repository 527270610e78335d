//! Error types for the concurrency primitives
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Error Enum ==
/// Unified error type for the cache, limiter and job runner.
#[derive(Error, Debug)]
pub enum Error {
    /// Limiter was asked for a slot set with no capacity
    #[error("Invalid capacity: must be greater than zero")]
    InvalidCapacity,

    /// Too many in-flight acquire attempts for a limiter slot
    #[error("Max queue size reached: {key}")]
    QueueOverflow { key: String },

    /// Cancellation token fired before a slot was granted
    #[error("Operation cancelled")]
    Cancelled,

    /// Deadline elapsed before a slot was granted
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Distributed lock could not be checked; try again later
    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    /// Job body returned an error
    #[error("Job {job} failed: {source}")]
    JobFailed {
        job: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Job body did not finish within its timeout
    #[error("Job {job} timed out after {timeout:?}")]
    JobTimedOut { job: String, timeout: Duration },
}

impl Error {
    /// Wraps a job body failure.
    pub(crate) fn job_failed(job: &str, source: anyhow::Error) -> Self {
        Error::JobFailed {
            job: job.to_string(),
            source: source.into(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failed_keeps_source_message() {
        let err = Error::job_failed("sync", anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "Job sync failed: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_queue_overflow_names_key() {
        let err = Error::QueueOverflow {
            key: "uploads:2".to_string(),
        };
        assert_eq!(err.to_string(), "Max queue size reached: uploads:2");
    }
}
