//! Maintenance jobs for the member index.
//!
//! - **cleanup**: removes index documents whose members are gone
//! - **pending**: drains pending queues left behind by writes or interrupted resyncs

pub mod cleanup;
pub mod pending;

pub use cleanup::{create_cleanup_job, run_cleanup, CleanupJobConfig, CLEANUP_JOB_NAME};
pub use pending::{
    create_pending_drain_job, run_pending_drain, PendingDrainJobConfig, PENDING_DRAIN_JOB_NAME,
};
