//! # member-search
//!
//! The member index, embedded with Tantivy.
//!
//! Stores one flattened document per member and serves the tenant scans that orphan
//! cleanup pages through.
//!
//! ## Features
//! - Embedded Tantivy index with MmapDirectory for persistence
//! - Whole-document replacement keyed by member id
//! - Tenant-filtered scans ordered by join time with search-after paging

pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod schema;
pub mod searcher;

pub use document::{doc_to_member, member_to_doc, StoredMember};
pub use error::SearchError;
pub use index::{MemberSearchIndex, SearchIndexConfig};
pub use indexer::MemberIndexer;
pub use schema::{build_member_schema, MemberSchema};
pub use searcher::MemberSearcher;
