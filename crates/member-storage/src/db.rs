//! RocksDB wrapper for the member store.
//!
//! Provides:
//! - Database open with column family setup
//! - Atomic snapshot writes (snapshot row + tenant link + pending entry)
//! - The per-tenant pending sync queue (reset, paged claim, mark synced)
//! - Tenant attribute definitions
//! - Existence checks used by orphan cleanup

use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_ATTRIBUTES, CF_PENDING_SYNC, CF_SNAPSHOTS,
    CF_SYNC_STATE, CF_TENANT_MEMBERS,
};
use crate::error::StorageError;
use crate::keys::{
    validate_component, AttributeKey, PendingKey, SnapshotKey, SyncedKey, TenantMemberKey,
};
use member_types::{AttributeDefinition, MemberSnapshot};

/// Main storage interface for member data
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Collect (key, value) pairs under a prefix in key order.
    #[allow(clippy::type_complexity)]
    fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut results = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }

    // ==================== Snapshots ====================

    /// Store one (member, segment) snapshot.
    ///
    /// The snapshot row, the tenant link and a pending sync entry are written in one
    /// batch, so every stored change is queued for the index.
    pub fn put_member_snapshot(&self, snapshot: &MemberSnapshot) -> Result<(), StorageError> {
        let snapshots_cf = self.cf(CF_SNAPSHOTS)?;
        let tenant_cf = self.cf(CF_TENANT_MEMBERS)?;
        let pending_cf = self.cf(CF_PENDING_SYNC)?;

        let snap_key = SnapshotKey::new(&snapshot.id, &snapshot.segment_id)?;
        let tm_key = TenantMemberKey::new(&snapshot.tenant_id, &snapshot.id)?;
        let pending_key = PendingKey::new(&snapshot.tenant_id, &snapshot.id)?;
        let bytes = snapshot.to_bytes()?;

        let mut batch = WriteBatch::default();
        batch.put_cf(snapshots_cf, snap_key.to_bytes(), bytes);
        batch.put_cf(tenant_cf, tm_key.to_bytes(), b"");
        batch.put_cf(pending_cf, pending_key.to_bytes(), b"");
        self.db.write(batch)?;

        debug!(
            member_id = %snapshot.id,
            segment_id = %snapshot.segment_id,
            "Stored member snapshot"
        );
        Ok(())
    }

    /// All snapshots of one member, in segment id order.
    pub fn get_member_snapshots(
        &self,
        member_id: &str,
    ) -> Result<Vec<MemberSnapshot>, StorageError> {
        validate_component("member_id", member_id)?;
        self.scan_prefix(CF_SNAPSHOTS, &SnapshotKey::member_prefix(member_id))?
            .into_iter()
            .map(|(_, value)| MemberSnapshot::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    /// Snapshots of several members, grouped in the order the ids were given.
    ///
    /// Unknown ids contribute nothing. Invalid ids are reported as key errors.
    pub fn get_snapshots_for(
        &self,
        member_ids: &[String],
    ) -> Result<Vec<MemberSnapshot>, StorageError> {
        let mut results = Vec::new();
        for id in member_ids {
            results.extend(self.get_member_snapshots(id)?);
        }
        Ok(results)
    }

    /// Remove a member with all of its snapshots, tenant links and queue entries.
    ///
    /// Returns false when nothing was stored for the member.
    pub fn delete_member(&self, member_id: &str) -> Result<bool, StorageError> {
        let snapshots = self.get_member_snapshots(member_id)?;
        if snapshots.is_empty() {
            return Ok(false);
        }

        let snapshots_cf = self.cf(CF_SNAPSHOTS)?;
        let tenant_cf = self.cf(CF_TENANT_MEMBERS)?;
        let pending_cf = self.cf(CF_PENDING_SYNC)?;
        let state_cf = self.cf(CF_SYNC_STATE)?;

        let mut batch = WriteBatch::default();
        for snapshot in &snapshots {
            let snap_key = SnapshotKey::new(&snapshot.id, &snapshot.segment_id)?;
            batch.delete_cf(snapshots_cf, snap_key.to_bytes());
            batch.delete_cf(
                tenant_cf,
                TenantMemberKey::new(&snapshot.tenant_id, member_id)?.to_bytes(),
            );
            batch.delete_cf(
                pending_cf,
                PendingKey::new(&snapshot.tenant_id, member_id)?.to_bytes(),
            );
        }
        batch.delete_cf(state_cf, SyncedKey::new(member_id)?.to_bytes());
        self.db.write(batch)?;

        debug!(member_id = %member_id, segments = snapshots.len(), "Deleted member");
        Ok(true)
    }

    /// Member ids of a tenant in id order.
    pub fn get_tenant_member_ids(&self, tenant_id: &str) -> Result<Vec<String>, StorageError> {
        validate_component("tenant_id", tenant_id)?;
        self.scan_prefix(CF_TENANT_MEMBERS, &TenantMemberKey::tenant_prefix(tenant_id))?
            .into_iter()
            .map(|(key, _)| TenantMemberKey::from_bytes(&key).map(|k| k.member_id))
            .collect()
    }

    /// Subset of `member_ids` that still belong to the tenant, in input order.
    pub fn existing_member_ids(
        &self,
        tenant_id: &str,
        member_ids: &[String],
    ) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(CF_TENANT_MEMBERS)?;
        let mut existing = Vec::new();
        for id in member_ids {
            // Ids that cannot form a key cannot have been stored either.
            let Ok(key) = TenantMemberKey::new(tenant_id, id) else {
                continue;
            };
            if self.db.get_cf(cf, key.to_bytes())?.is_some() {
                existing.push(id.clone());
            }
        }
        Ok(existing)
    }

    // ==================== Pending Queue ====================

    /// Replace the tenant's pending queue with all of its members.
    ///
    /// Returns the number of queued ids.
    pub fn reset_pending(&self, tenant_id: &str) -> Result<usize, StorageError> {
        let pending_cf = self.cf(CF_PENDING_SYNC)?;
        let prefix = PendingKey::tenant_prefix(tenant_id);

        let mut batch = WriteBatch::default();
        for (key, _) in self.scan_prefix(CF_PENDING_SYNC, &prefix)? {
            batch.delete_cf(pending_cf, key);
        }

        let member_ids = self.get_tenant_member_ids(tenant_id)?;
        for id in &member_ids {
            batch.put_cf(pending_cf, PendingKey::new(tenant_id, id)?.to_bytes(), b"");
        }
        self.db.write(batch)?;

        info!(tenant_id = %tenant_id, queued = member_ids.len(), "Reset pending queue");
        Ok(member_ids.len())
    }

    /// One page of the tenant's pending queue in member id order.
    ///
    /// Reading does not consume; ids leave the queue through [`Storage::mark_synced`].
    pub fn get_pending(
        &self,
        tenant_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<String>, StorageError> {
        validate_component("tenant_id", tenant_id)?;
        let prefix = PendingKey::tenant_prefix(tenant_id);
        let cf = self.cf(CF_PENDING_SYNC)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter.skip(page.saturating_mul(page_size)) {
            if ids.len() >= page_size {
                break;
            }
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            ids.push(PendingKey::from_bytes(&key)?.member_id);
        }
        Ok(ids)
    }

    /// Number of ids queued for the tenant.
    pub fn pending_count(&self, tenant_id: &str) -> Result<usize, StorageError> {
        validate_component("tenant_id", tenant_id)?;
        Ok(self
            .scan_prefix(CF_PENDING_SYNC, &PendingKey::tenant_prefix(tenant_id))?
            .len())
    }

    /// Acknowledge members as synced at `at`.
    ///
    /// Removes their queue entries and records the sync time. Ids with no stored
    /// snapshots have no queue entry left to remove and are skipped. Idempotent.
    pub fn mark_synced(
        &self,
        member_ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let pending_cf = self.cf(CF_PENDING_SYNC)?;
        let state_cf = self.cf(CF_SYNC_STATE)?;
        let stamp = at.to_rfc3339();

        let mut batch = WriteBatch::default();
        let mut marked = 0;
        for id in member_ids {
            let Some(first) = self.first_snapshot(id)? else {
                continue;
            };
            batch.delete_cf(pending_cf, PendingKey::new(&first.tenant_id, id)?.to_bytes());
            batch.put_cf(state_cf, SyncedKey::new(id)?.to_bytes(), stamp.as_bytes());
            marked += 1;
        }

        if marked > 0 {
            self.db.write(batch)?;
        }
        debug!(requested = member_ids.len(), marked, "Marked members synced");
        Ok(marked)
    }

    fn first_snapshot(&self, member_id: &str) -> Result<Option<MemberSnapshot>, StorageError> {
        let prefix = SnapshotKey::member_prefix(member_id);
        let cf = self.cf(CF_SNAPSHOTS)?;
        let mut iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if !key.starts_with(&prefix) {
                    return Ok(None);
                }
                Ok(Some(MemberSnapshot::from_bytes(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Time of the member's last acknowledged sync.
    pub fn last_synced_at(&self, member_id: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let cf = self.cf(CF_SYNC_STATE)?;
        let Some(raw) = self.db.get_cf(cf, SyncedKey::new(member_id)?.to_bytes())? else {
            return Ok(None);
        };
        let text = String::from_utf8(raw)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let ts = DateTime::parse_from_rfc3339(&text)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(ts.with_timezone(&Utc)))
    }

    // ==================== Attribute Definitions ====================

    /// Store (or replace) one attribute definition for a tenant.
    pub fn put_attribute_definition(
        &self,
        tenant_id: &str,
        definition: &AttributeDefinition,
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_ATTRIBUTES)?;
        let key = AttributeKey::new(tenant_id, &definition.name)?;
        let bytes = serde_json::to_vec(definition)?;
        self.db.put_cf(cf, key.to_bytes(), bytes)?;
        Ok(())
    }

    /// All attribute definitions of a tenant, in name order.
    pub fn get_attribute_definitions(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<AttributeDefinition>, StorageError> {
        validate_component("tenant_id", tenant_id)?;
        self.scan_prefix(CF_ATTRIBUTES, &AttributeKey::tenant_prefix(tenant_id))?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(StorageError::from))
            .collect()
    }

    // ===== Admin Operations =====

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();

        if let Some(cf) = self.db.cf_handle(CF_SNAPSHOTS) {
            stats.snapshot_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_TENANT_MEMBERS) {
            stats.member_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_PENDING_SYNC) {
            stats.pending_count = self.count_cf_entries(cf)?;
        }

        stats.disk_usage_bytes = self.get_disk_usage()?;

        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> Result<u64, StorageError> {
        let path = self.db.path();
        let mut total_size = 0u64;

        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }

        Ok(total_size)
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of (member, segment) snapshot rows
    pub snapshot_count: u64,
    /// Number of tenant-member links
    pub member_count: u64,
    /// Number of queued sync entries across tenants
    pub pending_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn snapshot(id: &str, tenant: &str, segment: &str) -> MemberSnapshot {
        let joined = Utc.with_ymd_and_hms(2024, 1, 29, 10, 0, 0).unwrap();
        MemberSnapshot::new(id, tenant, segment, format!("Member {}", id), joined)
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_snapshots_grouped_per_member() {
        let (storage, _temp) = create_test_storage();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-2")).unwrap();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("m-10", "t-1", "s-1")).unwrap();

        let rows = storage.get_member_snapshots("m-1").unwrap();
        let segments: Vec<_> = rows.iter().map(|s| s.segment_id.as_str()).collect();
        assert_eq!(segments, vec!["s-1", "s-2"]);

        let rows = storage
            .get_snapshots_for(&["m-10".to_string(), "m-1".to_string(), "gone".to_string()])
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["m-10", "m-1", "m-1"]);
    }

    #[test]
    fn test_put_snapshot_queues_member() {
        let (storage, _temp) = create_test_storage();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-2")).unwrap();

        assert_eq!(storage.pending_count("t-1").unwrap(), 1);
        assert_eq!(storage.get_tenant_member_ids("t-1").unwrap(), vec!["m-1"]);
    }

    #[test]
    fn test_pending_pages() {
        let (storage, _temp) = create_test_storage();
        for i in 0..5 {
            storage
                .put_member_snapshot(&snapshot(&format!("m-{}", i), "t-1", "s-1"))
                .unwrap();
        }
        storage.put_member_snapshot(&snapshot("x-1", "t-2", "s-1")).unwrap();

        assert_eq!(storage.get_pending("t-1", 0, 2).unwrap(), vec!["m-0", "m-1"]);
        assert_eq!(storage.get_pending("t-1", 2, 2).unwrap(), vec!["m-4"]);
        assert!(storage.get_pending("t-1", 3, 2).unwrap().is_empty());
        assert_eq!(storage.get_pending("t-2", 0, 10).unwrap(), vec!["x-1"]);
    }

    #[test]
    fn test_mark_synced_drains_queue() {
        let (storage, _temp) = create_test_storage();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("m-2", "t-1", "s-1")).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let marked = storage
            .mark_synced(&["m-1".to_string(), "unknown".to_string()], at)
            .unwrap();
        assert_eq!(marked, 1);
        assert_eq!(storage.get_pending("t-1", 0, 10).unwrap(), vec!["m-2"]);
        assert_eq!(storage.last_synced_at("m-1").unwrap(), Some(at));
        assert_eq!(storage.last_synced_at("m-2").unwrap(), None);

        // Idempotent
        storage.mark_synced(&["m-1".to_string()], at).unwrap();
        assert_eq!(storage.pending_count("t-1").unwrap(), 1);
    }

    #[test]
    fn test_reset_pending_requeues_all_members() {
        let (storage, _temp) = create_test_storage();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("m-2", "t-1", "s-1")).unwrap();
        let at = Utc::now();
        storage
            .mark_synced(&["m-1".to_string(), "m-2".to_string()], at)
            .unwrap();
        assert_eq!(storage.pending_count("t-1").unwrap(), 0);

        assert_eq!(storage.reset_pending("t-1").unwrap(), 2);
        assert_eq!(storage.get_pending("t-1", 0, 10).unwrap(), vec!["m-1", "m-2"]);
    }

    #[test]
    fn test_delete_member_removes_everything() {
        let (storage, _temp) = create_test_storage();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-2")).unwrap();

        assert!(storage.delete_member("m-1").unwrap());
        assert!(!storage.delete_member("m-1").unwrap());
        assert!(storage.get_member_snapshots("m-1").unwrap().is_empty());
        assert!(storage.get_tenant_member_ids("t-1").unwrap().is_empty());
        assert_eq!(storage.pending_count("t-1").unwrap(), 0);
    }

    #[test]
    fn test_existing_member_ids() {
        let (storage, _temp) = create_test_storage();
        storage.put_member_snapshot(&snapshot("a", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("c", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("b", "t-2", "s-1")).unwrap();

        let ids: Vec<String> = ["a", "b", "c", "d", "bad:id"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(storage.existing_member_ids("t-1", &ids).unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_attribute_definitions_roundtrip() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_attribute_definition("t-1", &AttributeDefinition::new("location", "STRING"))
            .unwrap();
        storage
            .put_attribute_definition("t-1", &AttributeDefinition::new("bio", "SPECIAL"))
            .unwrap();
        storage
            .put_attribute_definition("t-2", &AttributeDefinition::new("age", "NUMBER"))
            .unwrap();

        let defs = storage.get_attribute_definitions("t-1").unwrap();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["bio", "location"]);
        assert_eq!(defs[1].type_name, "STRING");
    }

    #[test]
    fn test_invalid_member_id_rejected() {
        let (storage, _temp) = create_test_storage();
        let result = storage.put_member_snapshot(&snapshot("m:1", "t-1", "s-1"));
        assert!(matches!(result, Err(StorageError::Key(_))));
    }

    #[test]
    fn test_stats_counts() {
        let (storage, _temp) = create_test_storage();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-1")).unwrap();
        storage.put_member_snapshot(&snapshot("m-1", "t-1", "s-2")).unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.snapshot_count, 2);
        assert_eq!(stats.member_count, 1);
        assert_eq!(stats.pending_count, 1);
    }
}
