//! Error types for the member-sync system.

use thiserror::Error;

/// Unified error type for member domain operations.
#[derive(Debug, Error)]
pub enum MemberError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attribute declared with a type the document schema cannot express
    #[error("Could not map attribute '{attribute}' of type '{type_name}' to an index field type")]
    UnmappedAttributeType {
        /// Attribute name as declared by the tenant
        attribute: String,
        /// The raw declared type
        type_name: String,
    },

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
