//! End-to-end test infrastructure for member-sync.
//!
//! Provides a shared TestHarness that wires a RocksDB member store and a tantivy
//! member index in a temp directory into the sync engine, plus helpers to seed
//! members and attribute definitions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use member_indexing::{
    CleanupReconciler, StorageMemberStore, SyncConfig, SyncOrchestrator, TantivyIndexClient,
};
use member_search::{MemberSearchIndex, SearchIndexConfig, StoredMember};
use member_storage::Storage;
use member_types::{AttributeDefinition, MemberSnapshot};

pub const INDEX_NAME: &str = "members";

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub store: Arc<StorageMemberStore>,
    pub index: MemberSearchIndex,
    pub client: Arc<TantivyIndexClient>,
    pub index_path: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("db");
        let index_path = temp_dir.path().join("member-index");

        let storage = Arc::new(Storage::open(&db_path).expect("Failed to open test storage"));
        let index = MemberSearchIndex::open_or_create(SearchIndexConfig::new(&index_path))
            .expect("Failed to create member index");
        let client = Arc::new(
            TantivyIndexClient::open(INDEX_NAME, &index).expect("Failed to open index client"),
        );

        Self {
            _temp_dir: temp_dir,
            store: Arc::new(StorageMemberStore::new(storage.clone())),
            storage,
            index,
            client,
            index_path,
        }
    }

    /// Engine defaults with a 1 ms retry delay.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_index_name(INDEX_NAME)
            .with_retry_delay(Duration::from_millis(1))
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        self.orchestrator_with(self.sync_config())
    }

    pub fn orchestrator_with(&self, config: SyncConfig) -> SyncOrchestrator {
        SyncOrchestrator::new(self.store.clone(), self.client.clone(), config)
    }

    pub fn reconciler(&self, page_size: usize) -> CleanupReconciler {
        CleanupReconciler::new(self.store.clone(), self.client.clone(), INDEX_NAME)
            .with_page_size(page_size)
    }

    /// Indexed document for a member, read back from tantivy.
    pub fn indexed(&self, member_id: &str) -> Option<StoredMember> {
        self.client
            .searcher()
            .get(member_id)
            .expect("Failed to read member index")
    }

    /// Indexed member ids of a tenant in join order.
    pub fn indexed_ids(&self, tenant_id: &str) -> Vec<String> {
        let searcher = self.client.searcher();
        let count = searcher
            .count_tenant(tenant_id)
            .expect("Failed to count tenant documents");
        searcher
            .scan_tenant(tenant_id, None, count)
            .expect("Failed to scan member index")
            .into_iter()
            .map(|member| member.id)
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Join time of the n-th generated member: one minute apart from 2024-01-01.
pub fn joined_at(n: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(n as i64)
}

/// Create `count` single-segment members named `<prefix>-<n>` with zero-padded n.
pub fn create_members(tenant_id: &str, prefix: &str, count: usize) -> Vec<MemberSnapshot> {
    (0..count)
        .map(|n| {
            MemberSnapshot::new(
                format!("{}-{:04}", prefix, n),
                tenant_id,
                "segment-main",
                format!("Member {}", n),
                joined_at(n),
            )
            .with_attribute("location", json!({ "default": format!("City {}", n % 7) }))
            .with_attribute("karma", json!({ "default": n as i64 }))
        })
        .collect()
}

/// Store snapshots; each write also queues its member for sync.
pub fn ingest_members(storage: &Storage, members: &[MemberSnapshot]) {
    for member in members {
        storage
            .put_member_snapshot(member)
            .expect("Failed to put member snapshot");
    }
}

/// Store attribute definitions for a tenant.
pub fn define_attributes(storage: &Storage, tenant_id: &str, definitions: &[(&str, &str)]) {
    for (name, type_name) in definitions {
        storage
            .put_attribute_definition(tenant_id, &AttributeDefinition::new(*name, *type_name))
            .expect("Failed to put attribute definition");
    }
}

/// The definitions matching the attributes set by [`create_members`].
pub fn define_default_attributes(storage: &Storage, tenant_id: &str) {
    define_attributes(storage, tenant_id, &[("location", "STRING"), ("karma", "NUMBER")]);
}

/// Nested value by path, e.g. `["obj_attributes", "obj_location", "string_default"]`.
pub fn source_path<'a>(member: &'a StoredMember, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut value = member.source.get(*first)?;
    for key in rest {
        value = value.get(*key)?;
    }
    Some(value)
}
