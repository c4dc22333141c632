//! Flattened member documents and the index field-prefix convention.
//!
//! Every field written to the member index carries a prefix naming its value type,
//! which is what lets the index map dynamically declared attributes without a
//! per-tenant mapping.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MemberError;

/// Top-level field holding the member id.
pub const FIELD_MEMBER_ID: &str = "uuid_memberId";
/// Top-level field holding the tenant id, used to filter per tenant.
pub const FIELD_TENANT_ID: &str = "uuid_tenantId";
/// Top-level join timestamp, the stable sort key for cleanup scans.
pub const FIELD_JOINED_AT: &str = "date_joinedAt";

/// Type prefix of an index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPrefix {
    Bool,
    Int,
    Float,
    String,
    Date,
    StringArr,
    Uuid,
    UuidArr,
    Obj,
    ObjArr,
}

impl FieldPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldPrefix::Bool => "bool",
            FieldPrefix::Int => "int",
            FieldPrefix::Float => "float",
            FieldPrefix::String => "string",
            FieldPrefix::Date => "date",
            FieldPrefix::StringArr => "string_arr",
            FieldPrefix::Uuid => "uuid",
            FieldPrefix::UuidArr => "uuid_arr",
            FieldPrefix::Obj => "obj",
            FieldPrefix::ObjArr => "obj_arr",
        }
    }

    /// Prefixed field name, e.g. `int_score`.
    pub fn field(&self, name: &str) -> String {
        format!("{}_{}", self.as_str(), name)
    }
}

impl fmt::Display for FieldPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a timestamp the way the index stores dates: RFC 3339, UTC, milliseconds.
pub fn format_date(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a date field value back into a timestamp.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, MemberError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemberError::InvalidInput(format!("invalid date '{}': {}", s, e)))
}

/// Index-ready representation of one member across all of its segments.
///
/// Documents are always written whole; a sync replaces the previous document for the
/// same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedDocument {
    /// Member id, also the index document id
    pub id: String,
    /// Prefixed document body
    pub body: Map<String, Value>,
}

impl FlattenedDocument {
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// Get a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Tenant the document belongs to.
    pub fn tenant_id(&self) -> Option<&str> {
        self.body.get(FIELD_TENANT_ID).and_then(Value::as_str)
    }

    /// Join timestamp (the cleanup sort key).
    pub fn joined_at(&self) -> Result<DateTime<Utc>, MemberError> {
        let raw = self
            .body
            .get(FIELD_JOINED_AT)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MemberError::InvalidInput(format!(
                    "document {} has no {}",
                    self.id, FIELD_JOINED_AT
                ))
            })?;
        parse_date(raw)
    }

    /// Serialize the body to JSON bytes.
    ///
    /// Object keys are emitted in sorted order, so equal documents serialize to equal
    /// bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.body)
    }

    /// The body as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_prefix_field_names() {
        assert_eq!(FieldPrefix::Int.field("score"), "int_score");
        assert_eq!(FieldPrefix::StringArr.field("emails"), "string_arr_emails");
        assert_eq!(FieldPrefix::ObjArr.field("segments"), "obj_arr_segments");
        assert_eq!(FieldPrefix::UuidArr.field("toMergeIds"), "uuid_arr_toMergeIds");
    }

    #[test]
    fn test_format_date_matches_iso_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 29, 10, 0, 0).unwrap();
        assert_eq!(format_date(&ts), "2024-01-29T10:00:00.000Z");
        assert_eq!(parse_date("2024-01-29T10:00:00.000Z").unwrap(), ts);
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_document_accessors() {
        let body = json!({
            "uuid_tenantId": "t-1",
            "date_joinedAt": "2024-01-29T10:00:00.000Z"
        });
        let doc = FlattenedDocument::new("m-1", body.as_object().cloned().unwrap());
        assert_eq!(doc.tenant_id(), Some("t-1"));
        assert_eq!(
            doc.joined_at().unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 29, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_document_without_join_date() {
        let doc = FlattenedDocument::new("m-1", Map::new());
        assert!(doc.joined_at().is_err());
        assert_eq!(doc.tenant_id(), None);
    }
}
