//! Scheduled orphan cleanup.
//!
//! Runs one cleanup pass per configured tenant. A failing tenant is logged and
//! the remaining tenants still run; the tick as a whole reports failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use member_indexing::CleanupReconciler;
use member_types::CleanupSettings;

use crate::{Jitter, OverlapPolicy, SchedulerError, SchedulerService};

pub const CLEANUP_JOB_NAME: &str = "member_cleanup";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupJobConfig {
    /// Cron expression (default: "0 0 3 * * *" = 03:00 daily)
    pub cron: String,
    pub timezone: String,
    pub jitter_secs: u64,
    pub tenants: Vec<String>,
}

impl Default for CleanupJobConfig {
    fn default() -> Self {
        Self::from_settings(&CleanupSettings::default())
    }
}

impl CleanupJobConfig {
    pub fn from_settings(settings: &CleanupSettings) -> Self {
        Self {
            cron: settings.cron.clone(),
            timezone: settings.timezone.clone(),
            jitter_secs: settings.jitter_secs,
            tenants: settings.tenants.clone(),
        }
    }
}

/// Clean every tenant once, stopping early on cancellation.
pub async fn run_cleanup(
    reconciler: &CleanupReconciler,
    tenants: &[String],
    token: &CancellationToken,
) -> Result<(), String> {
    let mut failed = Vec::new();
    for tenant_id in tenants {
        if token.is_cancelled() {
            info!(tenant_id = %tenant_id, "Cleanup cancelled before tenant");
            break;
        }
        match reconciler.cleanup(tenant_id).await {
            Ok(result) => info!(
                tenant_id = %tenant_id,
                removed = result.removed.len(),
                scanned = result.scanned,
                "Tenant cleanup finished"
            ),
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Tenant cleanup failed");
                failed.push(format!("{}: {}", tenant_id, e));
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(failed.join("; "))
    }
}

/// Register the cleanup job. Overlapping ticks are skipped.
pub async fn create_cleanup_job(
    scheduler: &SchedulerService,
    reconciler: Arc<CleanupReconciler>,
    config: CleanupJobConfig,
) -> Result<(), SchedulerError> {
    if config.tenants.is_empty() {
        return Err(SchedulerError::InvalidJob {
            name: CLEANUP_JOB_NAME.to_string(),
            reason: "no tenants configured".to_string(),
        });
    }

    let tenants = Arc::new(config.tenants);
    scheduler
        .register_job(
            CLEANUP_JOB_NAME,
            &config.cron,
            Some(&config.timezone),
            OverlapPolicy::Skip,
            Jitter::new(config.jitter_secs),
            move |token| {
                let reconciler = reconciler.clone();
                let tenants = tenants.clone();
                async move { run_cleanup(&reconciler, &tenants, &token).await }
            },
        )
        .await?;

    info!("Registered cleanup job");
    Ok(())
}
