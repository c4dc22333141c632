//! Key encoding and decoding for storage layer.
//!
//! Keys are `:`-separated, with the scan dimension first so RocksDB prefix
//! iteration serves every lookup:
//! - `snap:{member_id}:{segment_id}` - all segments of a member are adjacent
//! - `tm:{tenant_id}:{member_id}` - all members of a tenant are adjacent
//! - `pending:{tenant_id}:{member_id}` - a tenant's queue in member id order
//! - `attr:{tenant_id}:{name}` - a tenant's attribute definitions
//! - `synced:{member_id}` - last sync mark
//!
//! Id components must not contain `:`.

use crate::error::StorageError;

const SEP: char = ':';

/// Reject id components that would break key parsing.
pub fn validate_component(kind: &str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::Key(format!("{} must not be empty", kind)));
    }
    if value.contains(SEP) {
        return Err(StorageError::Key(format!(
            "{} must not contain '{}': {}",
            kind, SEP, value
        )));
    }
    Ok(())
}

fn key_str(bytes: &[u8]) -> Result<&str, StorageError> {
    std::str::from_utf8(bytes).map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))
}

/// Key for a member snapshot row
/// Format: snap:{member_id}:{segment_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotKey {
    pub member_id: String,
    pub segment_id: String,
}

impl SnapshotKey {
    pub fn new(member_id: &str, segment_id: &str) -> Result<Self, StorageError> {
        validate_component("member_id", member_id)?;
        validate_component("segment_id", segment_id)?;
        Ok(Self {
            member_id: member_id.to_string(),
            segment_id: segment_id.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("snap:{}:{}", self.member_id, self.segment_id).into_bytes()
    }

    /// Prefix covering every segment of one member
    pub fn member_prefix(member_id: &str) -> Vec<u8> {
        format!("snap:{}:", member_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = key_str(bytes)?;
        let parts: Vec<&str> = s.split(SEP).collect();
        if parts.len() != 3 || parts[0] != "snap" {
            return Err(StorageError::Key(format!("Invalid snapshot key format: {}", s)));
        }
        Self::new(parts[1], parts[2])
    }
}

/// Key linking a member to its tenant
/// Format: tm:{tenant_id}:{member_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantMemberKey {
    pub tenant_id: String,
    pub member_id: String,
}

impl TenantMemberKey {
    pub fn new(tenant_id: &str, member_id: &str) -> Result<Self, StorageError> {
        validate_component("tenant_id", tenant_id)?;
        validate_component("member_id", member_id)?;
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            member_id: member_id.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("tm:{}:{}", self.tenant_id, self.member_id).into_bytes()
    }

    pub fn tenant_prefix(tenant_id: &str) -> Vec<u8> {
        format!("tm:{}:", tenant_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = key_str(bytes)?;
        let parts: Vec<&str> = s.split(SEP).collect();
        if parts.len() != 3 || parts[0] != "tm" {
            return Err(StorageError::Key(format!("Invalid tenant member key format: {}", s)));
        }
        Self::new(parts[1], parts[2])
    }
}

/// Key for a pending sync entry
/// Format: pending:{tenant_id}:{member_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingKey {
    pub tenant_id: String,
    pub member_id: String,
}

impl PendingKey {
    pub fn new(tenant_id: &str, member_id: &str) -> Result<Self, StorageError> {
        validate_component("tenant_id", tenant_id)?;
        validate_component("member_id", member_id)?;
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            member_id: member_id.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("pending:{}:{}", self.tenant_id, self.member_id).into_bytes()
    }

    pub fn tenant_prefix(tenant_id: &str) -> Vec<u8> {
        format!("pending:{}:", tenant_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = key_str(bytes)?;
        let parts: Vec<&str> = s.split(SEP).collect();
        if parts.len() != 3 || parts[0] != "pending" {
            return Err(StorageError::Key(format!("Invalid pending key format: {}", s)));
        }
        Self::new(parts[1], parts[2])
    }
}

/// Key for a tenant attribute definition
/// Format: attr:{tenant_id}:{name}
///
/// The name is the last component and may itself contain `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeKey {
    pub tenant_id: String,
    pub name: String,
}

impl AttributeKey {
    pub fn new(tenant_id: &str, name: &str) -> Result<Self, StorageError> {
        validate_component("tenant_id", tenant_id)?;
        if name.is_empty() {
            return Err(StorageError::Key("attribute name must not be empty".to_string()));
        }
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("attr:{}:{}", self.tenant_id, self.name).into_bytes()
    }

    pub fn tenant_prefix(tenant_id: &str) -> Vec<u8> {
        format!("attr:{}:", tenant_id).into_bytes()
    }
}

/// Key for a member's last sync mark
/// Format: synced:{member_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedKey {
    pub member_id: String,
}

impl SyncedKey {
    pub fn new(member_id: &str) -> Result<Self, StorageError> {
        validate_component("member_id", member_id)?;
        Ok(Self {
            member_id: member_id.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("synced:{}", self.member_id).into_bytes()
    }
}
