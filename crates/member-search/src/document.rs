//! Mapping between flattened member documents and Tantivy documents.

use serde_json::{Map, Value};
use tantivy::schema::{Field, Value as _};
use tantivy::{doc, TantivyDocument};

use member_types::FlattenedDocument;

use crate::error::SearchError;
use crate::schema::MemberSchema;

/// A member document read back from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMember {
    pub id: String,
    pub tenant_id: String,
    /// Join time in epoch milliseconds
    pub joined_at_ms: i64,
    /// Flattened body as written
    pub source: Map<String, Value>,
}

/// Convert a flattened document to a Tantivy document.
///
/// The tenant id and join date are required: they are the filter and sort keys of
/// every tenant scan.
pub fn member_to_doc(
    schema: &MemberSchema,
    member: &FlattenedDocument,
) -> Result<TantivyDocument, SearchError> {
    let invalid = |reason: String| SearchError::InvalidDocument {
        id: member.id.clone(),
        reason,
    };

    let tenant_id = member
        .tenant_id()
        .ok_or_else(|| invalid("missing tenant id".to_string()))?;
    let joined_at = member.joined_at().map_err(|e| invalid(e.to_string()))?;
    let source = String::from_utf8(member.to_bytes()?)
        .map_err(|e| SearchError::Serialization(e.to_string()))?;

    Ok(doc!(
        schema.doc_id => member.id.clone(),
        schema.tenant_id => tenant_id.to_string(),
        schema.joined_at => joined_at.timestamp_millis(),
        schema.source => source
    ))
}

/// Read a stored Tantivy document back.
pub fn doc_to_member(
    schema: &MemberSchema,
    doc: &TantivyDocument,
) -> Result<StoredMember, SearchError> {
    let text = |field: Field, name: &str| {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| SearchError::SchemaMismatch(format!("stored document lacks {}", name)))
    };

    let id = text(schema.doc_id, "doc_id")?;
    let tenant_id = text(schema.tenant_id, "tenant_id")?;
    let joined_at_ms = doc
        .get_first(schema.joined_at)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| SearchError::SchemaMismatch("stored document lacks joined_at".into()))?;
    let source: Map<String, Value> = serde_json::from_str(&text(schema.source, "source")?)?;

    Ok(StoredMember {
        id,
        tenant_id,
        joined_at_ms,
        source,
    })
}
