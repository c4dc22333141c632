//! Cron scheduling for member index maintenance.
//!
//! Wraps `tokio-cron-scheduler` with timezone support, an overlap policy, start
//! jitter and graceful shutdown, and provides the two periodic jobs the daemon
//! runs: orphan cleanup and pending-queue drain.
//!
//! # Example
//!
//! ```ignore
//! use member_scheduler::{create_cleanup_job, CleanupJobConfig, SchedulerConfig, SchedulerService};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! create_cleanup_job(&scheduler, reconciler, CleanupJobConfig::from_settings(&settings.cleanup)).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod jitter;
mod overlap;
mod scheduler;

pub mod jobs;

pub use config::{parse_timezone, SchedulerConfig};
pub use error::SchedulerError;
pub use jitter::Jitter;
pub use jobs::{
    create_cleanup_job, create_pending_drain_job, CleanupJobConfig, PendingDrainJobConfig,
    CLEANUP_JOB_NAME, PENDING_DRAIN_JOB_NAME,
};
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use scheduler::{validate_cron_expression, JobRunner, RunOutcome, SchedulerService};
