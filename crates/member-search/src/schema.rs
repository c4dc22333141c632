//! Tantivy schema for the member index.
//!
//! Flattened documents carry tenant-defined fields, so the whole body is kept as
//! stored JSON. Only the fields the index keys, filters or sorts on get their own
//! tantivy field.

use tantivy::schema::{Field, Schema, FAST, INDEXED, STORED, STRING};

use crate::SearchError;

/// Field name of the document id
pub const DOC_ID: &str = "doc_id";
/// Field name of the tenant id
pub const TENANT_ID: &str = "tenant_id";
/// Field name of the join timestamp, epoch milliseconds
pub const JOINED_AT: &str = "joined_at";
/// Field name of the stored JSON body
pub const SOURCE: &str = "source";

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct MemberSchema {
    schema: Schema,
    /// Member id (STRING | STORED)
    pub doc_id: Field,
    /// Tenant filter (STRING | STORED)
    pub tenant_id: Field,
    /// Join time in epoch millis (INDEXED | FAST | STORED), the scan sort key
    pub joined_at: Field,
    /// Flattened document body as JSON text (STORED)
    pub source: Field,
}

impl MemberSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a MemberSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
        };
        let doc_id = field(DOC_ID)?;
        let tenant_id = field(TENANT_ID)?;
        let joined_at = field(JOINED_AT)?;
        let source = field(SOURCE)?;

        Ok(Self {
            schema,
            doc_id,
            tenant_id,
            joined_at,
            source,
        })
    }
}

/// Build the member index schema.
pub fn build_member_schema() -> MemberSchema {
    let mut schema_builder = Schema::builder();

    let doc_id = schema_builder.add_text_field(DOC_ID, STRING | STORED);
    let tenant_id = schema_builder.add_text_field(TENANT_ID, STRING | STORED);
    let joined_at = schema_builder.add_i64_field(JOINED_AT, INDEXED | FAST | STORED);
    let source = schema_builder.add_text_field(SOURCE, STORED);

    let schema = schema_builder.build();

    MemberSchema {
        schema,
        doc_id,
        tenant_id,
        joined_at,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_schema() {
        let schema = build_member_schema();
        assert!(schema.schema.get_field(DOC_ID).is_ok());
        assert!(schema.schema.get_field(TENANT_ID).is_ok());
        assert!(schema.schema.get_field(JOINED_AT).is_ok());
        assert!(schema.schema.get_field(SOURCE).is_ok());
    }

    #[test]
    fn test_from_schema() {
        let original = build_member_schema();
        let rebuilt = MemberSchema::from_schema(original.schema().clone()).unwrap();
        assert_eq!(rebuilt.doc_id, original.doc_id);
        assert_eq!(rebuilt.joined_at, original.joined_at);
    }

    #[test]
    fn test_from_foreign_schema_fails() {
        let mut builder = Schema::builder();
        builder.add_text_field("text", STRING);
        let result = MemberSchema::from_schema(builder.build());
        assert!(matches!(result, Err(SearchError::SchemaMismatch(_))));
    }
}
