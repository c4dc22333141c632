//! Scheduled pending-queue drain.
//!
//! Runs a resync without reset for each tenant, which indexes whatever is still
//! queued and resumes runs that were interrupted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use member_indexing::SyncOrchestrator;
use member_types::Settings;

use crate::{Jitter, OverlapPolicy, SchedulerError, SchedulerService};

pub const PENDING_DRAIN_JOB_NAME: &str = "member_pending_drain";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDrainJobConfig {
    /// Cron expression (default: "0 */5 * * * *" = every five minutes)
    pub cron: String,
    pub timezone: String,
    pub jitter_secs: u64,
    pub batch_size: usize,
    pub tenants: Vec<String>,
}

impl Default for PendingDrainJobConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl PendingDrainJobConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cron: settings.cleanup.pending_cron.clone(),
            timezone: settings.cleanup.timezone.clone(),
            jitter_secs: settings.cleanup.jitter_secs,
            batch_size: settings.sync.batch_size,
            tenants: settings.cleanup.tenants.clone(),
        }
    }
}

/// Drain each tenant's pending queue once.
pub async fn run_pending_drain(
    orchestrator: &SyncOrchestrator,
    tenants: &[String],
    batch_size: usize,
    token: &CancellationToken,
) -> Result<(), String> {
    let mut failed = Vec::new();
    for tenant_id in tenants {
        if token.is_cancelled() {
            break;
        }
        match orchestrator.full_resync(tenant_id, false, batch_size).await {
            Ok(result) if result.members_synced == 0 => {
                debug!(tenant_id = %tenant_id, "Pending queue empty");
            }
            Ok(result) => info!(
                tenant_id = %tenant_id,
                run_id = %result.run_id,
                members_synced = result.members_synced,
                "Pending queue drained"
            ),
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Pending drain failed");
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

pub async fn create_pending_drain_job(
    scheduler: &SchedulerService,
    orchestrator: Arc<SyncOrchestrator>,
    config: PendingDrainJobConfig,
) -> Result<(), SchedulerError> {
    if config.tenants.is_empty() {
        return Err(SchedulerError::InvalidJob {
            name: PENDING_DRAIN_JOB_NAME.to_string(),
            reason: "no tenants configured".to_string(),
        });
    }
    if config.batch_size == 0 {
        return Err(SchedulerError::InvalidJob {
            name: PENDING_DRAIN_JOB_NAME.to_string(),
            reason: "batch size must be > 0".to_string(),
        });
    }

    let tenants = Arc::new(config.tenants);
    let batch_size = config.batch_size;
    scheduler
        .register_job(
            PENDING_DRAIN_JOB_NAME,
            &config.cron,
            Some(&config.timezone),
            OverlapPolicy::Skip,
            Jitter::new(config.jitter_secs),
            move |token| {
                let orchestrator = orchestrator.clone();
                let tenants = tenants.clone();
                async move { run_pending_drain(&orchestrator, &tenants, batch_size, &token).await }
            },
        )
        .await?;

    info!("Registered pending drain job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use member_indexing::mock::{InMemoryIndex, InMemoryMemberStore};
    use member_indexing::SyncConfig;
    use member_types::MemberSnapshot;

    #[test]
    fn test_config_from_settings() {
        let config = PendingDrainJobConfig::default();
        assert_eq!(config.cron, "0 */5 * * * *");
        assert_eq!(config.batch_size, 200);
        assert!(config.tenants.is_empty());
    }

    #[tokio::test]
    async fn test_drain_indexes_queued_members() {
        let store = Arc::new(InMemoryMemberStore::new());
        let index = Arc::new(InMemoryIndex::new());
        let joined = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        store.insert_snapshot(MemberSnapshot::new("m-1", "t-1", "s-1", "Ann", joined));
        store.insert_snapshot(MemberSnapshot::new("m-2", "t-1", "s-1", "Bob", joined));
        let orchestrator = SyncOrchestrator::new(store.clone(), index.clone(), SyncConfig::default());

        run_pending_drain(&orchestrator, &["t-1".to_string()], 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(index.ids("members"), vec!["m-1", "m-2"]);
        assert!(store.pending_ids("t-1").is_empty());
    }

    #[tokio::test]
    async fn test_drain_reports_write_failure() {
        let store = Arc::new(InMemoryMemberStore::new());
        let index = Arc::new(InMemoryIndex::new());
        let joined = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        store.insert_snapshot(MemberSnapshot::new("m-1", "t-1", "s-1", "Ann", joined));
        index.fail_writes_after(0);
        let orchestrator = SyncOrchestrator::new(store.clone(), index, SyncConfig::default());

        let err = run_pending_drain(&orchestrator, &["t-1".to_string()], 10, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.starts_with("t-1:"));
        assert_eq!(store.pending_ids("t-1"), vec!["m-1"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_rejects_zero_batch() {
        let scheduler = SchedulerService::new(Default::default()).await.unwrap();
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(InMemoryMemberStore::new()),
            Arc::new(InMemoryIndex::new()),
            SyncConfig::default(),
        ));
        let config = PendingDrainJobConfig {
            batch_size: 0,
            tenants: vec!["t-1".to_string()],
            ..Default::default()
        };

        let result = create_pending_drain_job(&scheduler, orchestrator, config).await;
        assert!(matches!(result, Err(SchedulerError::InvalidJob { .. })));
    }
}
