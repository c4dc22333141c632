//! Orphan reconciliation.
//!
//! Pages through a tenant's documents in join order and deletes every document
//! whose member no longer exists in the store. Pages are fetched with search-after
//! on the join date of the previous page's last hit, so the scan always moves
//! forward and ends on the first empty page.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use member_types::FIELD_JOINED_AT;

use crate::client::{IndexClient, SearchRequest, SyncCursor};
use crate::error::SyncError;
use crate::store::MemberStore;

/// Documents fetched per cleanup page.
pub const DEFAULT_CLEANUP_PAGE_SIZE: usize = 500;

/// Summary of one cleanup pass.
#[derive(Debug, Clone, Default)]
pub struct CleanupResult {
    pub tenant_id: String,
    /// Non-empty pages scanned
    pub pages: usize,
    /// Documents inspected
    pub scanned: usize,
    /// Orphans deleted, in deletion order
    pub removed: Vec<String>,
    pub elapsed_ms: u64,
}

/// Removes index documents whose members are gone.
pub struct CleanupReconciler {
    store: Arc<dyn MemberStore>,
    index: Arc<dyn IndexClient>,
    index_name: String,
    page_size: usize,
}

impl CleanupReconciler {
    pub fn new(
        store: Arc<dyn MemberStore>,
        index: Arc<dyn IndexClient>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            index,
            index_name: index_name.into(),
            page_size: DEFAULT_CLEANUP_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Scan the tenant once and delete its orphans.
    ///
    /// A failed delete aborts the pass; orphans deleted before it stay deleted.
    pub async fn cleanup(&self, tenant_id: &str) -> Result<CleanupResult, SyncError> {
        let start = Instant::now();
        let mut result = CleanupResult {
            tenant_id: tenant_id.to_string(),
            ..Default::default()
        };
        let mut cursor: Option<SyncCursor> = None;

        info!(tenant_id, page_size = self.page_size, "Starting orphan cleanup");

        loop {
            let request = SearchRequest::tenant_scan(tenant_id, self.page_size)
                .with_cursor(cursor)
                .with_source_fields([FIELD_JOINED_AT]);
            let hits = self
                .index
                .search(&self.index_name, &request)
                .await
                .map_err(|e| e.in_cleanup(tenant_id))?;

            let Some(last) = hits.last() else {
                break;
            };
            let next = SyncCursor::from_hit(last).map_err(|e| e.in_cleanup(tenant_id))?;

            let ids: Vec<String> = hits.iter().map(|hit| hit.id.clone()).collect();
            let existing: HashSet<String> = self
                .store
                .existing_ids(tenant_id, &ids)
                .await
                .map_err(|e| e.in_cleanup(tenant_id))?
                .into_iter()
                .collect();

            let mut removed_on_page = 0;
            for id in ids.iter().filter(|id| !existing.contains(*id)) {
                self.index
                    .delete(&self.index_name, id)
                    .await
                    .map_err(|source| SyncError::Orphan {
                        tenant_id: tenant_id.to_string(),
                        member_id: id.clone(),
                        source: Box::new(source),
                    })?;
                result.removed.push(id.clone());
                removed_on_page += 1;
            }

            result.pages += 1;
            result.scanned += ids.len();
            debug!(
                tenant_id,
                page = result.pages,
                hits = ids.len(),
                removed = removed_on_page,
                "Cleanup page done"
            );

            cursor = Some(next);
        }

        result.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            tenant_id,
            pages = result.pages,
            scanned = result.scanned,
            removed = result.removed.len(),
            elapsed_ms = result.elapsed_ms,
            "Orphan cleanup complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{document, InMemoryIndex, InMemoryMemberStore};
    use chrono::{TimeZone, Utc};
    use member_types::MemberSnapshot;

    fn joined(day: u32) -> String {
        format!("2024-01-{:02}T00:00:00.000Z", day)
    }

    fn member(id: &str, day: u32) -> MemberSnapshot {
        let joined_at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        MemberSnapshot::new(id, "t-1", "s-1", id, joined_at)
    }

    fn setup(
        indexed: &[(&str, u32)],
        existing: &[&str],
    ) -> (Arc<InMemoryMemberStore>, Arc<InMemoryIndex>) {
        let store = Arc::new(InMemoryMemberStore::new());
        let index = Arc::new(InMemoryIndex::new());
        for (id, day) in indexed {
            index.insert("members", document(id, "t-1", &joined(*day)));
            if existing.contains(id) {
                store.insert_snapshot(member(id, *day));
            }
        }
        (store, index)
    }

    #[tokio::test]
    async fn test_cleanup_removes_exactly_the_orphans() {
        let (store, index) = setup(&[("A", 1), ("B", 2), ("C", 3), ("D", 4)], &["A", "C"]);
        let reconciler = CleanupReconciler::new(store, index.clone(), "members");

        let result = reconciler.cleanup("t-1").await.unwrap();

        assert_eq!(result.removed, vec!["B", "D"]);
        assert_eq!(result.scanned, 4);
        assert_eq!(index.ids("members"), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_cleanup_pages_terminate() {
        let indexed: Vec<(String, u32)> = (1..=7).map(|d| (format!("m-{}", d), d)).collect();
        let refs: Vec<(&str, u32)> = indexed.iter().map(|(id, d)| (id.as_str(), *d)).collect();
        let (store, index) = setup(&refs, &["m-1", "m-2", "m-3", "m-4", "m-5", "m-6", "m-7"]);
        let reconciler = CleanupReconciler::new(store, index.clone(), "members").with_page_size(3);

        let result = reconciler.cleanup("t-1").await.unwrap();

        // ceil(7 / 3) non-empty pages plus the terminating empty one.
        assert_eq!(result.pages, 3);
        assert_eq!(index.search_calls(), 4);
        assert!(result.removed.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_ignores_other_tenants() {
        let (store, index) = setup(&[("A", 1)], &["A"]);
        index.insert("members", document("X", "t-2", &joined(2)));
        let reconciler = CleanupReconciler::new(store, index.clone(), "members");

        let result = reconciler.cleanup("t-1").await.unwrap();

        assert_eq!(result.scanned, 1);
        assert_eq!(index.len("members"), 2);
    }

    #[tokio::test]
    async fn test_cleanup_delete_failure_aborts() {
        let (store, index) = setup(&[("A", 1), ("B", 2), ("C", 3)], &[]);
        index.fail_deletes_after(1);
        let reconciler = CleanupReconciler::new(store, index.clone(), "members");

        let err = reconciler.cleanup("t-1").await.unwrap_err();

        match err {
            SyncError::Orphan {
                tenant_id,
                member_id,
                ..
            } => {
                assert_eq!(tenant_id, "t-1");
                assert_eq!(member_id, "B");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(index.ids("members"), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_cleanup_of_empty_tenant() {
        let (store, index) = setup(&[], &[]);
        let reconciler = CleanupReconciler::new(store, index.clone(), "members");

        let result = reconciler.cleanup("t-1").await.unwrap();

        assert_eq!(result.pages, 0);
        assert_eq!(index.search_calls(), 1);
    }

    #[test]
    fn test_default_page_size() {
        let reconciler = CleanupReconciler::new(
            Arc::new(InMemoryMemberStore::new()),
            Arc::new(InMemoryIndex::new()),
            "members",
        );
        assert_eq!(reconciler.page_size(), DEFAULT_CLEANUP_PAGE_SIZE);
    }
}
