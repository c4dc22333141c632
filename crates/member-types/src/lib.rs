//! # member-types
//!
//! Shared domain types for the member search-index sync system.
//!
//! - Attribute schema: tenant-declared member attributes and their types
//! - Member snapshots: one row per (member, segment) pair from the member store
//! - Flattened documents: the type-prefixed form written to the member index
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use member_types::{AttributeSchema, AttributeType};
//!
//! let schema = AttributeSchema::from_typed([("bio", AttributeType::String)]);
//! assert_eq!(schema.len(), 1);
//! ```

pub mod attribute;
pub mod config;
pub mod document;
pub mod error;
pub mod member;

pub use attribute::{AttributeDefinition, AttributeSchema, AttributeType, TypedAttribute};
pub use config::{CleanupSettings, Settings, SyncSettings};
pub use document::{
    format_date, parse_date, FieldPrefix, FlattenedDocument, FIELD_JOINED_AT, FIELD_MEMBER_ID,
    FIELD_TENANT_ID,
};
pub use error::MemberError;
pub use member::{MemberIdentity, MemberOrganization, MemberSnapshot, MemberTag};
