//! Random start delay for scheduled runs.
//!
//! Several daemons pointed at the same store would otherwise start cleanup on
//! the same second.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound for the random delay applied before each run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jitter {
    pub max_secs: u64,
}

impl Jitter {
    pub fn new(max_secs: u64) -> Self {
        Self { max_secs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.max_secs > 0
    }

    /// A delay in `[0, max_secs)` with millisecond resolution.
    pub fn sample(&self) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }
        let millis = rand::rng().random_range(0..self.max_secs.saturating_mul(1000));
        Duration::from_millis(millis)
    }

    /// Sleep for a sampled delay. Returns the delay applied.
    pub async fn delay(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            tracing::debug!(jitter_ms = delay.as_millis() as u64, "Delaying scheduled run");
            tokio::time::sleep(delay).await;
        }
        delay
    }
}
