//! Error types for the scheduler crate.

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Errors raised while configuring or running the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// A job definition is unusable, e.g. no tenants to work on.
    #[error("Invalid job '{name}': {reason}")]
    InvalidJob { name: String, reason: String },

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::InvalidCron("'bad': parse error".to_string());
        assert!(err.to_string().contains("Invalid cron expression"));

        let err = SchedulerError::InvalidJob {
            name: "member_cleanup".to_string(),
            reason: "no tenants".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid job 'member_cleanup': no tenants");

        assert!(SchedulerError::AlreadyRunning
            .to_string()
            .contains("already running"));
    }
}
