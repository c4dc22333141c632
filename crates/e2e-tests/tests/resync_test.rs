//! Full resync E2E tests.
//!
//! Members are written to RocksDB, resynchronized through the engine and read
//! back from the tantivy index.

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{
    create_members, define_attributes, define_default_attributes, ingest_members, joined_at,
    source_path, TestHarness,
};
use member_types::{MemberSnapshot, FIELD_JOINED_AT, FIELD_TENANT_ID};

#[tokio::test]
async fn test_full_resync_indexes_every_member_in_batches() {
    let harness = TestHarness::new();
    define_default_attributes(&harness.storage, "t-1");
    ingest_members(&harness.storage, &create_members("t-1", "m", 25));

    let result = harness
        .orchestrator()
        .full_resync("t-1", true, 10)
        .await
        .unwrap();

    assert_eq!(result.queued, Some(25));
    assert_eq!(result.batches, 3);
    assert_eq!(result.members_synced, 25);
    assert_eq!(result.documents_indexed, 25);
    assert!(result.missing.is_empty());
    assert_eq!(harness.storage.pending_count("t-1").unwrap(), 0);
    assert_eq!(harness.client.searcher().count_tenant("t-1").unwrap(), 25);
}

#[tokio::test]
async fn test_indexed_document_shape() {
    let harness = TestHarness::new();
    define_default_attributes(&harness.storage, "t-1");
    ingest_members(&harness.storage, &create_members("t-1", "m", 4));

    harness
        .orchestrator()
        .full_resync("t-1", true, 200)
        .await
        .unwrap();

    let member = harness.indexed("m-0003").expect("m-0003 should be indexed");
    assert_eq!(member.tenant_id, "t-1");
    assert_eq!(member.joined_at_ms, joined_at(3).timestamp_millis());
    assert_eq!(member.source[FIELD_TENANT_ID], json!("t-1"));
    assert_eq!(member.source[FIELD_JOINED_AT], json!("2024-01-01T00:03:00.000Z"));
    assert_eq!(member.source["string_displayName"], json!("Member 3"));
    assert_eq!(
        source_path(&member, &["obj_attributes", "obj_location", "string_default"]),
        Some(&json!("City 3"))
    );
    assert_eq!(
        source_path(&member, &["obj_attributes", "obj_karma", "int_default"]),
        Some(&json!(3))
    );
}

#[tokio::test]
async fn test_member_segments_merge_into_one_document() {
    let harness = TestHarness::new();
    let joined = joined_at(0);
    let mut first = MemberSnapshot::new("m-1", "t-1", "s-a", "Ann", joined);
    first.activity_count = 4;
    let mut second = MemberSnapshot::new("m-1", "t-1", "s-b", "Ann", joined);
    second.activity_count = 9;
    ingest_members(&harness.storage, &[first, second]);

    let result = harness
        .orchestrator()
        .full_resync("t-1", true, 200)
        .await
        .unwrap();

    assert_eq!(result.members_synced, 1);
    assert_eq!(result.documents_indexed, 1);
    let member = harness.indexed("m-1").unwrap();
    let segments = member.source["obj_arr_segments"].as_array().unwrap();
    let counts: Vec<_> = segments
        .iter()
        .map(|s| (s["uuid_segmentId"].clone(), s["int_activityCount"].clone()))
        .collect();
    assert_eq!(
        counts,
        vec![(json!("s-a"), json!(4)), (json!("s-b"), json!(9))]
    );
}

#[tokio::test]
async fn test_resync_without_reset_drains_remaining_queue() {
    let harness = TestHarness::new();
    let members = create_members("t-1", "m", 5);
    ingest_members(&harness.storage, &members);
    let orchestrator = harness.orchestrator();

    orchestrator
        .sync_members(&["m-0000".to_string(), "m-0001".to_string()])
        .await
        .unwrap();
    assert_eq!(harness.storage.pending_count("t-1").unwrap(), 3);

    let result = orchestrator.full_resync("t-1", false, 2).await.unwrap();

    assert_eq!(result.queued, None);
    assert_eq!(result.members_synced, 3);
    assert_eq!(result.batches, 2);
    assert_eq!(
        harness.indexed_ids("t-1"),
        vec!["m-0000", "m-0001", "m-0002", "m-0003", "m-0004"]
    );
}

#[tokio::test]
async fn test_rewritten_member_is_reindexed() {
    let harness = TestHarness::new();
    ingest_members(&harness.storage, &create_members("t-1", "m", 1));
    let orchestrator = harness.orchestrator();
    orchestrator.full_resync("t-1", true, 10).await.unwrap();

    let renamed = MemberSnapshot::new("m-0000", "t-1", "segment-main", "Renamed", joined_at(0));
    harness.storage.put_member_snapshot(&renamed).unwrap();
    let result = orchestrator.full_resync("t-1", false, 10).await.unwrap();

    assert_eq!(result.members_synced, 1);
    let member = harness.indexed("m-0000").unwrap();
    assert_eq!(member.source["string_displayName"], json!("Renamed"));
    assert_eq!(harness.client.searcher().count_tenant("t-1").unwrap(), 1);
}

#[tokio::test]
async fn test_resync_is_scoped_to_tenant() {
    let harness = TestHarness::new();
    ingest_members(&harness.storage, &create_members("t-1", "a", 3));
    ingest_members(&harness.storage, &create_members("t-2", "b", 2));

    harness
        .orchestrator()
        .full_resync("t-1", true, 10)
        .await
        .unwrap();

    assert_eq!(harness.indexed_ids("t-1").len(), 3);
    assert!(harness.indexed_ids("t-2").is_empty());
    assert_eq!(harness.storage.pending_count("t-2").unwrap(), 2);
}

#[tokio::test]
async fn test_unmapped_attribute_type_aborts_before_writes() {
    let harness = TestHarness::new();
    define_attributes(&harness.storage, "t-1", &[("location", "GEOPOINT")]);
    ingest_members(&harness.storage, &create_members("t-1", "m", 3));

    let err = harness
        .orchestrator()
        .full_resync("t-1", true, 10)
        .await
        .unwrap_err();

    assert!(err.is_schema_error(), "unexpected error: {err}");
    assert!(err.to_string().contains("t-1"));
    assert_eq!(harness.client.searcher().num_docs(), 0);
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected() {
    let harness = TestHarness::new();
    let result = harness.orchestrator().full_resync("t-1", true, 0).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_repeated_resync_leaves_one_identical_document() {
    let harness = TestHarness::new();
    define_default_attributes(&harness.storage, "t-1");
    ingest_members(&harness.storage, &create_members("t-1", "m", 5));
    let orchestrator = harness.orchestrator();

    orchestrator.full_resync("t-1", true, 2).await.unwrap();
    let before = harness.indexed("m-0002").unwrap();
    orchestrator.full_resync("t-1", true, 3).await.unwrap();
    let after = harness.indexed("m-0002").unwrap();

    assert_eq!(before, after);
    assert_eq!(harness.client.searcher().num_docs(), 5);
}
