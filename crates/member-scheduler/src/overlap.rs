//! Overlap handling for scheduled runs.
//!
//! A cleanup pass over a large tenant can outlive its cron interval. With
//! [`OverlapPolicy::Skip`] the late tick is dropped instead of starting a second
//! scan of the same tenant.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What to do when a tick fires while the previous run is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    #[default]
    Skip,
    Concurrent,
}

/// Per-job running flag plus a count of skipped ticks.
#[derive(Clone)]
pub struct OverlapGuard {
    running: Arc<AtomicBool>,
    skipped: Arc<AtomicU64>,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            skipped: Arc::new(AtomicU64::new(0)),
            policy,
        }
    }

    /// Claim the job for one run, or `None` when the tick must be skipped.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        match self.policy {
            OverlapPolicy::Concurrent => Some(RunGuard { flag: None }),
            OverlapPolicy::Skip => {
                if self
                    .running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    Some(RunGuard {
                        flag: Some(self.running.clone()),
                    })
                } else {
                    self.skipped.fetch_add(1, Ordering::SeqCst);
                    None
                }
            }
        }
    }

    /// Only meaningful under [`OverlapPolicy::Skip`].
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// Clears the running flag on drop, including when the run panics.
pub struct RunGuard {
    flag: Option<Arc<AtomicBool>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(flag) = &self.flag {
            flag.store(false, Ordering::SeqCst);
        }
    }
}
