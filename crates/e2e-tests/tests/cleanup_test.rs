//! Orphan cleanup E2E tests.
//!
//! Documents are indexed through a resync, members are then deleted from the
//! store behind the engine's back, and cleanup must remove exactly those.

use pretty_assertions::assert_eq;

use e2e_tests::{create_members, ingest_members, joined_at, TestHarness};
use member_types::MemberSnapshot;

async fn indexed_tenant(harness: &TestHarness, tenant_id: &str, members: &[MemberSnapshot]) {
    ingest_members(&harness.storage, members);
    harness
        .orchestrator()
        .full_resync(tenant_id, true, 100)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cleanup_removes_deleted_members() {
    let harness = TestHarness::new();
    let members: Vec<_> = ["A", "B", "C", "D"]
        .iter()
        .enumerate()
        .map(|(n, id)| MemberSnapshot::new(*id, "t-1", "s-1", *id, joined_at(n)))
        .collect();
    indexed_tenant(&harness, "t-1", &members).await;

    harness.storage.delete_member("B").unwrap();
    harness.storage.delete_member("D").unwrap();
    let result = harness.reconciler(500).cleanup("t-1").await.unwrap();

    assert_eq!(result.removed, vec!["B", "D"]);
    assert_eq!(result.scanned, 4);
    assert_eq!(result.pages, 1);
    assert_eq!(harness.indexed_ids("t-1"), vec!["A", "C"]);
}

#[tokio::test]
async fn test_cleanup_pages_through_tenant() {
    let harness = TestHarness::new();
    indexed_tenant(&harness, "t-1", &create_members("t-1", "m", 25)).await;

    let deleted: Vec<String> = (0..25)
        .step_by(3)
        .map(|n| format!("m-{:04}", n))
        .collect();
    for id in &deleted {
        harness.storage.delete_member(id).unwrap();
    }

    let result = harness.reconciler(10).cleanup("t-1").await.unwrap();

    assert_eq!(result.pages, 3);
    assert_eq!(result.scanned, 25);
    assert_eq!(result.removed, deleted);
    assert_eq!(
        harness.client.searcher().count_tenant("t-1").unwrap(),
        25 - deleted.len()
    );
}

#[tokio::test]
async fn test_cleanup_leaves_other_tenants_alone() {
    let harness = TestHarness::new();
    indexed_tenant(&harness, "t-1", &create_members("t-1", "a", 3)).await;
    indexed_tenant(&harness, "t-2", &create_members("t-2", "b", 3)).await;

    harness.storage.delete_member("b-0001").unwrap();
    let result = harness.reconciler(500).cleanup("t-1").await.unwrap();

    assert!(result.removed.is_empty());
    assert_eq!(harness.indexed_ids("t-2").len(), 3);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let harness = TestHarness::new();
    indexed_tenant(&harness, "t-1", &create_members("t-1", "m", 6)).await;
    harness.storage.delete_member("m-0002").unwrap();
    let reconciler = harness.reconciler(4);

    let first = reconciler.cleanup("t-1").await.unwrap();
    let second = reconciler.cleanup("t-1").await.unwrap();

    assert_eq!(first.removed, vec!["m-0002"]);
    assert!(second.removed.is_empty());
    assert_eq!(second.scanned, 5);
}

#[tokio::test]
async fn test_cleanup_of_unindexed_tenant() {
    let harness = TestHarness::new();
    let result = harness.reconciler(500).cleanup("nobody").await.unwrap();
    assert_eq!(result.pages, 0);
    assert_eq!(result.scanned, 0);
}
