//! Search error types.

use thiserror::Error;

/// Errors that can occur in the member index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Index is locked (another process has it open)
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// Request named an index this client does not serve
    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    /// Filter or sort the index cannot evaluate
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Document lacks a field the index keys on
    #[error("Invalid document {id}: {reason}")]
    InvalidDocument { id: String, reason: String },

    /// Stored source could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}
