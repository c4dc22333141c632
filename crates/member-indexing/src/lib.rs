//! Member index synchronization engine.
//!
//! Keeps the member index eventually consistent with the member store.
//!
//! ## Key Components
//!
//! - [`AttributeFlattener`]: maps a member's segment snapshots to one prefixed document
//! - [`MemberStore`]: relational member data and the per-tenant pending queue
//! - [`IndexClient`]: search, bulk write, write and delete on the member index
//! - [`SyncOrchestrator`]: full tenant resync and incremental per-member sync
//! - [`CleanupReconciler`]: removes documents whose members no longer exist
//!
//! The orchestrator and the reconciler never call each other. Both take their
//! collaborators as `Arc<dyn ...>`, so the RocksDB/Tantivy adapters and the
//! in-memory doubles in [`mock`] are interchangeable.
//!
//! ## Example
//!
//! ```ignore
//! use member_indexing::{SyncConfig, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::new(store, index, SyncConfig::default());
//! let result = orchestrator.full_resync("tenant-1", true, 200).await?;
//! println!("indexed {} documents", result.documents_indexed);
//! ```

pub mod cleanup;
pub mod client;
pub mod error;
pub mod flatten;
pub mod mock;
pub mod orchestrator;
pub mod store;

pub use cleanup::{CleanupReconciler, CleanupResult, DEFAULT_CLEANUP_PAGE_SIZE};
pub use client::{
    IndexClient, SearchHit, SearchRequest, SortOrder, SortSpec, SyncCursor, TantivyIndexClient,
    TermFilter,
};
pub use error::SyncError;
pub use flatten::{trim_to_bytes, AttributeFlattener, DEFAULT_MAX_STRING_BYTES};
pub use orchestrator::{
    BatchOutcome, MemberSyncOutcome, ResyncResult, SyncConfig, SyncOrchestrator,
};
pub use store::{group_snapshots, MemberStore, SnapshotGroups, StorageMemberStore};
