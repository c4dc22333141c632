//! The member store seam.
//!
//! [`MemberStore`] is the relational side of the sync: member snapshots, tenant
//! attribute definitions and the per-tenant pending queue. [`StorageMemberStore`]
//! serves it from RocksDB.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use member_storage::Storage;
use member_types::{AttributeDefinition, MemberSnapshot};

use crate::error::SyncError;

/// Snapshots grouped by member id, each group in fetch order.
pub type SnapshotGroups = BTreeMap<String, Vec<MemberSnapshot>>;

/// Group fetched rows by member id.
pub fn group_snapshots(rows: Vec<MemberSnapshot>) -> SnapshotGroups {
    let mut groups = SnapshotGroups::new();
    for row in rows {
        groups.entry(row.id.clone()).or_default().push(row);
    }
    groups
}

/// Relational member data plus the pending sync queue.
///
/// Every operation is idempotent at the id level.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Replace the tenant's pending queue with all of its member ids.
    ///
    /// Returns the number of queued ids.
    async fn reset_pending(&self, tenant_id: &str) -> Result<usize, SyncError>;

    /// One page of the tenant's pending queue.
    ///
    /// Claiming does not consume: ids leave the queue through [`MemberStore::mark_synced`].
    async fn claim_pending(
        &self,
        tenant_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<String>, SyncError>;

    /// All segment snapshots of the given members. Unknown ids contribute nothing.
    async fn fetch_snapshots(&self, member_ids: &[String]) -> Result<Vec<MemberSnapshot>, SyncError>;

    /// The tenant's declared attributes.
    async fn fetch_attribute_definitions(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<AttributeDefinition>, SyncError>;

    /// Acknowledge members as synced, removing them from the pending queue.
    ///
    /// Returns how many of `member_ids` the store acknowledged.
    async fn mark_synced(&self, member_ids: &[String]) -> Result<usize, SyncError>;

    /// The subset of `member_ids` that still exist for the tenant.
    async fn existing_ids(
        &self,
        tenant_id: &str,
        member_ids: &[String],
    ) -> Result<Vec<String>, SyncError>;
}

/// [`MemberStore`] over the RocksDB storage layer.
pub struct StorageMemberStore {
    storage: Arc<Storage>,
}

impl StorageMemberStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// The wrapped storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }
}

#[async_trait]
impl MemberStore for StorageMemberStore {
    async fn reset_pending(&self, tenant_id: &str) -> Result<usize, SyncError> {
        Ok(self.storage.reset_pending(tenant_id)?)
    }

    async fn claim_pending(
        &self,
        tenant_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<String>, SyncError> {
        Ok(self.storage.get_pending(tenant_id, page, page_size)?)
    }

    async fn fetch_snapshots(&self, member_ids: &[String]) -> Result<Vec<MemberSnapshot>, SyncError> {
        Ok(self.storage.get_snapshots_for(member_ids)?)
    }

    async fn fetch_attribute_definitions(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<AttributeDefinition>, SyncError> {
        Ok(self.storage.get_attribute_definitions(tenant_id)?)
    }

    async fn mark_synced(&self, member_ids: &[String]) -> Result<usize, SyncError> {
        Ok(self.storage.mark_synced(member_ids, Utc::now())?)
    }

    async fn existing_ids(
        &self,
        tenant_id: &str,
        member_ids: &[String],
    ) -> Result<Vec<String>, SyncError> {
        Ok(self.storage.existing_member_ids(tenant_id, member_ids)?)
    }
}
