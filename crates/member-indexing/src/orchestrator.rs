//! Full and incremental synchronization of the member index.
//!
//! Full resync drains a tenant's pending queue in batches: claim, fetch, group,
//! flatten, bulk write, mark synced. A batch is only marked after its bulk write
//! succeeded, so a failed run can be resumed by draining again without reset.
//!
//! Incremental sync handles a single member right after it changed. The member
//! may not be visible yet on the read side, so a not-found is retried after a
//! fixed delay. When the retry budget runs out the member is treated as gone and
//! its document is deleted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use ulid::Ulid;

use member_types::{AttributeSchema, FlattenedDocument, MemberError, Settings};

use crate::client::IndexClient;
use crate::error::SyncError;
use crate::flatten::{AttributeFlattener, DEFAULT_MAX_STRING_BYTES};
use crate::store::{group_snapshots, MemberStore, SnapshotGroups};

/// Configuration for synchronization runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Index documents are written to.
    pub index_name: String,
    /// Pending ids claimed per full-resync batch.
    pub batch_size: usize,
    /// Retries after the first not-found in incremental sync.
    pub max_retries: u32,
    /// Fixed delay between incremental retries.
    pub retry_delay: Duration,
    /// Byte budget for STRING and SPECIAL attribute values.
    pub max_string_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            index_name: "members".to_string(),
            batch_size: 200,
            max_retries: 5,
            retry_delay: Duration::from_millis(100),
            max_string_bytes: DEFAULT_MAX_STRING_BYTES,
        }
    }
}

impl SyncConfig {
    /// Build from application settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            index_name: settings.index_name.clone(),
            batch_size: settings.sync.batch_size,
            max_retries: settings.sync.max_retries,
            retry_delay: Duration::from_millis(settings.sync.retry_delay_ms),
            max_string_bytes: settings.sync.max_string_bytes,
        }
    }

    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Terminal state of an incremental sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSyncOutcome {
    /// The member was found and its document written.
    Synced { attempts: u32 },
    /// The member never appeared and its document was deleted.
    Removed { attempts: u32 },
}

/// Outcome of writing one batch of members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Documents written
    pub documents_indexed: usize,
    /// Requested ids with no snapshots
    pub missing: Vec<String>,
    /// Ids the store acknowledged as synced
    pub acknowledged: usize,
}

/// Summary of a full resync run.
#[derive(Debug, Clone, Default)]
pub struct ResyncResult {
    pub run_id: String,
    pub tenant_id: String,
    /// Ids queued by the reset, if one was requested
    pub queued: Option<usize>,
    /// Non-empty batches processed
    pub batches: usize,
    /// Pending ids acknowledged
    pub members_synced: usize,
    /// Documents written
    pub documents_indexed: usize,
    /// Claimed ids whose snapshots had disappeared
    pub missing: Vec<String>,
    pub elapsed_ms: u64,
}

/// Drives full and incremental synchronization.
///
/// Holds no state of its own; the store owns the pending queue and the index owns
/// the documents.
pub struct SyncOrchestrator {
    store: Arc<dyn MemberStore>,
    index: Arc<dyn IndexClient>,
    flattener: AttributeFlattener,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn MemberStore>, index: Arc<dyn IndexClient>, config: SyncConfig) -> Self {
        Self {
            store,
            index,
            flattener: AttributeFlattener::new(config.max_string_bytes),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Load and validate a tenant's attribute schema.
    pub async fn load_schema(&self, tenant_id: &str) -> Result<AttributeSchema, SyncError> {
        let definitions = self.store.fetch_attribute_definitions(tenant_id).await?;
        AttributeSchema::from_definitions(&definitions).map_err(|source| SyncError::Schema {
            tenant_id: tenant_id.to_string(),
            source,
        })
    }

    /// Resynchronize a tenant from its pending queue.
    ///
    /// With `reset`, the queue is first refilled with every member of the tenant.
    /// Without it, the run only drains what is left, which resumes an earlier run.
    /// The run ends when a claim comes back empty. A batch the store acknowledges
    /// none of fails with [`SyncError::Stalled`], since claiming it again cannot
    /// make progress.
    pub async fn full_resync(
        &self,
        tenant_id: &str,
        reset: bool,
        batch_size: usize,
    ) -> Result<ResyncResult, SyncError> {
        if batch_size == 0 {
            return Err(MemberError::InvalidInput("batch size must be > 0".to_string()).into());
        }

        let start = Instant::now();
        let run_id = Ulid::new().to_string();
        let mut result = ResyncResult {
            run_id: run_id.clone(),
            tenant_id: tenant_id.to_string(),
            ..Default::default()
        };

        info!(tenant_id, run_id = %run_id, reset, batch_size, "Starting full resync");

        if reset {
            let queued = self
                .store
                .reset_pending(tenant_id)
                .await
                .map_err(|e| e.in_batch(tenant_id, &run_id, 0))?;
            info!(tenant_id, run_id = %run_id, queued, "Pending queue reset");
            result.queued = Some(queued);
        }

        let schema = self.load_schema(tenant_id).await?;
        let schemas = BTreeMap::from([(tenant_id.to_string(), schema)]);

        loop {
            let batch = result.batches + 1;

            // Marking removes ids from the queue, so the next batch is always page 0.
            let ids = self
                .store
                .claim_pending(tenant_id, 0, batch_size)
                .await
                .map_err(|e| e.in_batch(tenant_id, &run_id, batch))?;
            if ids.is_empty() {
                break;
            }

            let rows = self
                .store
                .fetch_snapshots(&ids)
                .await
                .map_err(|e| e.in_batch(tenant_id, &run_id, batch))?;
            let outcome = self
                .write_groups(&ids, group_snapshots(rows), &schemas)
                .await
                .map_err(|e| e.in_batch(tenant_id, &run_id, batch))?;
            if outcome.acknowledged == 0 {
                return Err(SyncError::Stalled {
                    tenant_id: tenant_id.to_string(),
                    run_id,
                    batch,
                });
            }

            result.batches = batch;
            result.members_synced += ids.len();
            result.documents_indexed += outcome.documents_indexed;
            if !outcome.missing.is_empty() {
                warn!(
                    tenant_id,
                    run_id = %run_id,
                    batch,
                    missing = outcome.missing.len(),
                    "Claimed members had no snapshots"
                );
            }
            result.missing.extend(outcome.missing);

            info!(
                tenant_id,
                run_id = %run_id,
                batch,
                claimed = ids.len(),
                indexed = outcome.documents_indexed,
                total = result.members_synced,
                "Resync batch complete"
            );
        }

        result.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            tenant_id,
            run_id = %run_id,
            batches = result.batches,
            members = result.members_synced,
            documents = result.documents_indexed,
            elapsed_ms = result.elapsed_ms,
            "Full resync complete"
        );
        Ok(result)
    }

    /// Sync an explicit set of members in one bulk write.
    ///
    /// Members may belong to different tenants; each tenant's schema is loaded once.
    /// All requested ids are marked synced, including those with no snapshots.
    pub async fn sync_members(&self, member_ids: &[String]) -> Result<BatchOutcome, SyncError> {
        if member_ids.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let groups = group_snapshots(self.store.fetch_snapshots(member_ids).await?);

        let mut schemas = BTreeMap::new();
        for snapshots in groups.values() {
            let Some(first) = snapshots.first() else {
                continue;
            };
            if !schemas.contains_key(&first.tenant_id) {
                let schema = self.load_schema(&first.tenant_id).await?;
                schemas.insert(first.tenant_id.clone(), schema);
            }
        }

        self.write_groups(member_ids, groups, &schemas).await
    }

    /// Flatten grouped snapshots, bulk write them, then acknowledge `ids`.
    async fn write_groups(
        &self,
        ids: &[String],
        groups: SnapshotGroups,
        schemas: &BTreeMap<String, AttributeSchema>,
    ) -> Result<BatchOutcome, SyncError> {
        let mut documents: Vec<FlattenedDocument> = Vec::with_capacity(groups.len());
        for (member_id, snapshots) in &groups {
            let tenant_id = snapshots.first().map(|s| s.tenant_id.as_str()).unwrap_or_default();
            let schema = schemas.get(tenant_id).ok_or_else(|| {
                SyncError::Store(format!(
                    "member {} belongs to unexpected tenant {}",
                    member_id, tenant_id
                ))
            })?;
            documents.push(self.flattener.flatten(snapshots, schema)?);
        }

        self.index
            .bulk_write(&self.config.index_name, &documents)
            .await?;
        let acknowledged = self.store.mark_synced(ids).await?;

        let found: BTreeSet<&str> = groups.keys().map(String::as_str).collect();
        let missing = ids
            .iter()
            .filter(|id| !found.contains(id.as_str()))
            .cloned()
            .collect();

        Ok(BatchOutcome {
            documents_indexed: documents.len(),
            missing,
            acknowledged,
        })
    }

    /// Sync one member, retrying while it is not yet visible.
    pub async fn sync_member(&self, member_id: &str) -> Result<MemberSyncOutcome, SyncError> {
        self.sync_member_at(member_id, 0).await
    }

    /// Sync one member starting at a given attempt number.
    ///
    /// Attempts run from `attempt` up to the configured retry budget with a fixed
    /// delay in between. A member still missing after the last attempt is deleted
    /// from the index.
    pub async fn sync_member_at(
        &self,
        member_id: &str,
        attempt: u32,
    ) -> Result<MemberSyncOutcome, SyncError> {
        let ids = [member_id.to_string()];
        let mut current = attempt;

        loop {
            let attempts = current - attempt + 1;

            let mut rows = self
                .store
                .fetch_snapshots(&ids)
                .await
                .map_err(|e| e.for_member(member_id))?;
            rows.retain(|row| row.id == member_id);

            if let Some(first) = rows.first() {
                let tenant_id = first.tenant_id.clone();
                self.write_member(&tenant_id, &rows)
                    .await
                    .map_err(|e| e.for_member(member_id))?;
                self.store
                    .mark_synced(&ids)
                    .await
                    .map_err(|e| e.for_member(member_id))?;

                info!(member_id, tenant_id = %tenant_id, attempts, "Member synced");
                return Ok(MemberSyncOutcome::Synced { attempts });
            }

            if current >= self.config.max_retries {
                self.index
                    .delete(&self.config.index_name, member_id)
                    .await
                    .map_err(|e| e.for_member(member_id))?;

                info!(member_id, attempts, "Member not found, removed from index");
                return Ok(MemberSyncOutcome::Removed { attempts });
            }

            debug!(
                member_id,
                attempt = current,
                delay_ms = self.config.retry_delay.as_millis() as u64,
                "Member not found yet, retrying"
            );
            tokio::time::sleep(self.config.retry_delay).await;
            current += 1;
        }
    }

    async fn write_member(
        &self,
        tenant_id: &str,
        rows: &[member_types::MemberSnapshot],
    ) -> Result<(), SyncError> {
        let schema = self.load_schema(tenant_id).await?;
        let document = self.flattener.flatten(rows, &schema)?;
        self.index.write(&self.config.index_name, &document).await
    }

    /// Delete one member's document.
    pub async fn remove_member(&self, member_id: &str) -> Result<(), SyncError> {
        self.index
            .delete(&self.config.index_name, member_id)
            .await
            .map_err(|e| e.for_member(member_id))?;
        info!(member_id, "Member removed from index");
        Ok(())
    }
}
