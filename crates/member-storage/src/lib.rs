//! Storage layer for the member store.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for snapshots, tenant links, the pending queue,
//!   attribute definitions and sync marks
//! - Member-first snapshot keys so all segments of a member are one prefix scan
//! - Atomic writes via WriteBatch

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{AttributeKey, PendingKey, SnapshotKey, SyncedKey, TenantMemberKey};
