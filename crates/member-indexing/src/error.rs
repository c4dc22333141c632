//! Error types for the sync engine.

use member_search::SearchError;
use member_storage::StorageError;
use member_types::MemberError;
use thiserror::Error;

/// Errors that can occur while synchronizing the member index
#[derive(Error, Debug)]
pub enum SyncError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Member index operation failed
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Domain validation failed
    #[error("Member error: {0}")]
    Member(#[from] MemberError),

    /// A member store implementation failed
    #[error("Store error: {0}")]
    Store(String),

    /// An index client implementation failed
    #[error("Index error: {0}")]
    Index(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The tenant's attribute schema could not be mapped
    #[error("Attribute schema of tenant {tenant_id} is invalid: {source}")]
    Schema {
        tenant_id: String,
        source: MemberError,
    },

    /// A full resync batch failed
    #[error("Resync of tenant {tenant_id} failed (run {run_id}, batch {batch}): {source}")]
    Batch {
        tenant_id: String,
        run_id: String,
        batch: usize,
        source: Box<SyncError>,
    },

    /// A claimed batch was written but the store acknowledged none of it
    #[error("Pending queue of tenant {tenant_id} did not advance (run {run_id}, batch {batch})")]
    Stalled {
        tenant_id: String,
        run_id: String,
        batch: usize,
    },

    /// Incremental sync of one member failed
    #[error("Sync of member {member_id} failed: {source}")]
    MemberSync {
        member_id: String,
        source: Box<SyncError>,
    },

    /// Cleanup could not page through the tenant
    #[error("Cleanup of tenant {tenant_id} failed: {source}")]
    Cleanup {
        tenant_id: String,
        source: Box<SyncError>,
    },

    /// Removing an orphaned document failed
    #[error("Removing orphan {member_id} of tenant {tenant_id} failed: {source}")]
    Orphan {
        tenant_id: String,
        member_id: String,
        source: Box<SyncError>,
    },
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl SyncError {
    pub(crate) fn in_batch(self, tenant_id: &str, run_id: &str, batch: usize) -> Self {
        SyncError::Batch {
            tenant_id: tenant_id.to_string(),
            run_id: run_id.to_string(),
            batch,
            source: Box::new(self),
        }
    }

    pub(crate) fn for_member(self, member_id: &str) -> Self {
        SyncError::MemberSync {
            member_id: member_id.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_cleanup(self, tenant_id: &str) -> Self {
        SyncError::Cleanup {
            tenant_id: tenant_id.to_string(),
            source: Box::new(self),
        }
    }

    /// True when the failure came from an unmappable attribute schema.
    pub fn is_schema_error(&self) -> bool {
        match self {
            SyncError::Schema { .. } => true,
            SyncError::Batch { source, .. }
            | SyncError::MemberSync { source, .. }
            | SyncError::Cleanup { source, .. }
            | SyncError::Orphan { source, .. } => source.is_schema_error(),
            _ => false,
        }
    }
}
