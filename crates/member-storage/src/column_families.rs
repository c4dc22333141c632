//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - snapshots: (member, segment) snapshot rows, keyed by member id first
//! - tenant_members: tenant -> member membership links for tenant scans
//! - pending_sync: per-tenant queue of member ids awaiting index sync
//! - attributes: per-tenant attribute definitions
//! - sync_state: last successful sync time per member

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for member snapshot rows
pub const CF_SNAPSHOTS: &str = "snapshots";

/// Column family name for tenant membership links
pub const CF_TENANT_MEMBERS: &str = "tenant_members";

/// Column family name for the pending sync queue
pub const CF_PENDING_SYNC: &str = "pending_sync";

/// Column family name for tenant attribute definitions
pub const CF_ATTRIBUTES: &str = "attributes";

/// Column family name for per-member sync marks
pub const CF_SYNC_STATE: &str = "sync_state";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_SNAPSHOTS,
    CF_TENANT_MEMBERS,
    CF_PENDING_SYNC,
    CF_ATTRIBUTES,
    CF_SYNC_STATE,
];

/// Snapshot rows are the bulk of the data; compress them.
fn snapshots_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_SNAPSHOTS, snapshots_options()),
        ColumnFamilyDescriptor::new(CF_TENANT_MEMBERS, Options::default()),
        ColumnFamilyDescriptor::new(CF_PENDING_SYNC, Options::default()),
        ColumnFamilyDescriptor::new(CF_ATTRIBUTES, Options::default()),
        ColumnFamilyDescriptor::new(CF_SYNC_STATE, Options::default()),
    ]
}
