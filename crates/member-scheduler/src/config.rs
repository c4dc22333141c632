//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timezone for jobs registered without one (IANA name).
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// How long shutdown waits for running jobs after cancelling them.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Use the timezone configured for member maintenance as the default.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.default_timezone = timezone.into();
        self
    }

    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        parse_timezone(&self.default_timezone)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<chrono_tz::Tz, SchedulerError> {
    name.parse::<chrono_tz::Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}
