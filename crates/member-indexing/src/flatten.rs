//! Flattening of segment snapshots into one prefixed index document.
//!
//! Every field name carries a type prefix (see [`FieldPrefix`]). Tenant attributes
//! are mapped through the tenant's [`AttributeSchema`]:
//!
//! - `SPECIAL` attributes are serialized whole to JSON text under `string_<name>`.
//! - Every other attribute is an object of per-source values with a `default`
//!   key. It becomes `obj_<name>` holding `<prefix>_<source>` for each source, the
//!   prefix chosen from the type and the `default` value.
//!
//! Flattening is pure and deterministic: the same input always yields the same
//! document bytes.

use serde_json::{json, Map, Value};

use member_types::{
    format_date, AttributeSchema, AttributeType, FieldPrefix, FlattenedDocument, MemberError,
    MemberOrganization, MemberSnapshot, MemberTag, TypedAttribute, FIELD_JOINED_AT,
    FIELD_MEMBER_ID, FIELD_TENANT_ID,
};

/// Default byte budget for STRING and SPECIAL attribute values.
pub const DEFAULT_MAX_STRING_BYTES: usize = 25_000;

/// Sub-key holding an attribute's effective value.
const DEFAULT_SUBKEY: &str = "default";

/// Maps member snapshots to a [`FlattenedDocument`].
#[derive(Debug, Clone, Copy)]
pub struct AttributeFlattener {
    max_string_bytes: usize,
}

impl Default for AttributeFlattener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STRING_BYTES)
    }
}

impl AttributeFlattener {
    pub fn new(max_string_bytes: usize) -> Self {
        Self { max_string_bytes }
    }

    /// Flatten all segment snapshots of one member.
    ///
    /// Member-level fields and the attribute bag come from the first snapshot; the
    /// segments array has one entry per snapshot in input order.
    ///
    /// # Errors
    ///
    /// Returns `MemberError::InvalidInput` when `snapshots` is empty, or when the
    /// snapshots belong to more than one member.
    pub fn flatten(
        &self,
        snapshots: &[MemberSnapshot],
        schema: &AttributeSchema,
    ) -> Result<FlattenedDocument, MemberError> {
        let first = snapshots.first().ok_or_else(|| {
            MemberError::InvalidInput("cannot flatten a member without snapshots".to_string())
        })?;
        if let Some(other) = snapshots.iter().find(|s| s.id != first.id) {
            return Err(MemberError::InvalidInput(format!(
                "snapshots of members {} and {} cannot share a document",
                first.id, other.id
            )));
        }

        let mut body = Map::new();
        body.insert(FIELD_MEMBER_ID.to_string(), json!(first.id));
        body.insert(FIELD_TENANT_ID.to_string(), json!(first.tenant_id));
        body.insert(
            FieldPrefix::String.field("displayName"),
            json!(first.display_name),
        );
        body.insert(
            FieldPrefix::Obj.field("attributes"),
            Value::Object(self.flatten_attributes(&first.attributes, schema)?),
        );
        body.insert(FieldPrefix::StringArr.field("emails"), json!(first.emails));
        body.insert(FieldPrefix::Int.field("score"), json!(first.score));
        body.insert(
            FieldPrefix::Date.field("lastEnriched"),
            json!(first.last_enriched.as_ref().map(format_date)),
        );
        body.insert(FIELD_JOINED_AT.to_string(), json!(format_date(&first.joined_at)));
        body.insert(FieldPrefix::Int.field("totalReach"), json!(first.total_reach));
        body.insert(
            FieldPrefix::Int.field("numberOfOpenSourceContributions"),
            json!(first.number_of_open_source_contributions),
        );
        body.insert(
            FieldPrefix::ObjArr.field("identities"),
            Value::Array(
                first
                    .identities
                    .iter()
                    .map(|identity| {
                        json!({
                            "string_platform": identity.platform,
                            "string_username": identity.username,
                        })
                    })
                    .collect(),
            ),
        );
        body.insert(
            FieldPrefix::UuidArr.field("toMergeIds"),
            json!(first.to_merge_ids),
        );
        body.insert(
            FieldPrefix::UuidArr.field("noMergeIds"),
            json!(first.no_merge_ids),
        );
        body.insert(
            FieldPrefix::ObjArr.field("segments"),
            Value::Array(snapshots.iter().map(segment_entry).collect()),
        );

        Ok(FlattenedDocument::new(first.id.clone(), body))
    }

    /// Map the attribute bag through the schema. Bag entries without a schema entry
    /// are dropped, as are schema entries missing from the bag. A null value counts
    /// as missing, at the top level and per source.
    fn flatten_attributes(
        &self,
        bag: &Map<String, Value>,
        schema: &AttributeSchema,
    ) -> Result<Map<String, Value>, MemberError> {
        let mut out = Map::new();
        for attribute in schema.iter() {
            let Some(value) = bag.get(&attribute.name).filter(|v| !v.is_null()) else {
                continue;
            };

            if attribute.attribute_type == AttributeType::Special {
                let text = serde_json::to_string(value)?;
                out.insert(
                    FieldPrefix::String.field(&attribute.name),
                    Value::String(trim_to_bytes(&text, self.max_string_bytes).to_string()),
                );
                continue;
            }

            let sources: Map<String, Value> = match value {
                Value::Object(sources) => sources
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                scalar => {
                    let mut sources = Map::new();
                    sources.insert(DEFAULT_SUBKEY.to_string(), scalar.clone());
                    sources
                }
            };
            if sources.is_empty() {
                continue;
            }

            let prefix = attribute_prefix(attribute, sources.get(DEFAULT_SUBKEY));
            let nested = sources
                .into_iter()
                .map(|(source, v)| (prefix.field(&source), self.attribute_value(attribute, v)))
                .collect();
            out.insert(FieldPrefix::Obj.field(&attribute.name), Value::Object(nested));
        }
        Ok(out)
    }

    fn attribute_value(&self, attribute: &TypedAttribute, value: Value) -> Value {
        match (attribute.attribute_type, value) {
            (AttributeType::String, Value::String(s)) => {
                Value::String(trim_to_bytes(&s, self.max_string_bytes).to_string())
            }
            (_, v) => v,
        }
    }
}

/// Field prefix of a non-special attribute.
fn attribute_prefix(attribute: &TypedAttribute, default: Option<&Value>) -> FieldPrefix {
    match attribute.attribute_type {
        AttributeType::Boolean => FieldPrefix::Bool,
        AttributeType::Number => {
            if default.is_some_and(is_integer_valued) {
                FieldPrefix::Int
            } else {
                FieldPrefix::Float
            }
        }
        AttributeType::Email
        | AttributeType::String
        | AttributeType::Url
        | AttributeType::Special => FieldPrefix::String,
        AttributeType::Date => FieldPrefix::Date,
        AttributeType::MultiSelect => FieldPrefix::StringArr,
    }
}

fn is_integer_valued(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => true,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0),
        _ => false,
    }
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a character.
pub fn trim_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn segment_entry(snapshot: &MemberSnapshot) -> Value {
    json!({
        "uuid_segmentId": snapshot.segment_id,
        "obj_arr_organizations":
            snapshot.organizations.iter().map(organization_entry).collect::<Vec<_>>(),
        "obj_arr_tags": snapshot.tags.iter().map(tag_entry).collect::<Vec<_>>(),
        "string_arr_activeOn": snapshot.active_on,
        "int_activityCount": snapshot.activity_count,
        "string_arr_activityTypes": snapshot.activity_types,
        "int_activeDaysCount": snapshot.active_days_count,
        "date_lastActive": snapshot.last_active.as_ref().map(format_date),
        "float_averageSentiment": snapshot.average_sentiment,
    })
}

fn organization_entry(org: &MemberOrganization) -> Value {
    json!({
        "uuid_id": org.id,
        "string_displayName": org.display_name,
        "string_logo": org.logo,
        "obj_memberOrganizations": {
            "string_title": org.title,
            "date_dateStart": org.date_start.as_ref().map(format_date),
            "date_dateEnd": org.date_end.as_ref().map(format_date),
        },
    })
}

fn tag_entry(tag: &MemberTag) -> Value {
    json!({
        "uuid_id": tag.id,
        "string_name": tag.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use member_types::{AttributeDefinition, MemberIdentity};

    fn snapshot(segment: &str) -> MemberSnapshot {
        let joined = Utc.with_ymd_and_hms(2024, 1, 29, 10, 0, 0).unwrap();
        MemberSnapshot::new("m-1", "t-1", segment, "Ada", joined)
    }

    fn attrs(doc: &FlattenedDocument) -> &Map<String, Value> {
        doc.field("obj_attributes").and_then(Value::as_object).unwrap()
    }

    #[test]
    fn test_number_prefix_follows_default_value() {
        let schema = AttributeSchema::from_typed([
            ("age", AttributeType::Number),
            ("rating", AttributeType::Number),
        ]);
        let member = snapshot("s-1")
            .with_attribute("age", json!({"default": 5, "github": 6}))
            .with_attribute("rating", json!({"default": 5.5}));

        let doc = AttributeFlattener::default().flatten(&[member], &schema).unwrap();
        let attrs = attrs(&doc);
        assert_eq!(attrs["obj_age"], json!({"int_default": 5, "int_github": 6}));
        assert_eq!(attrs["obj_rating"], json!({"float_default": 5.5}));
    }

    #[test]
    fn test_whole_float_counts_as_integer() {
        let schema = AttributeSchema::from_typed([("age", AttributeType::Number)]);
        let member = snapshot("s-1").with_attribute("age", json!({"default": 5.0}));

        let doc = AttributeFlattener::default().flatten(&[member], &schema).unwrap();
        assert!(attrs(&doc)["obj_age"].get("int_default").is_some());
    }

    #[test]
    fn test_prefix_per_attribute_type() {
        let schema = AttributeSchema::from_typed([
            ("isHireable", AttributeType::Boolean),
            ("email", AttributeType::Email),
            ("website", AttributeType::Url),
            ("since", AttributeType::Date),
            ("skills", AttributeType::MultiSelect),
        ]);
        let member = snapshot("s-1")
            .with_attribute("isHireable", json!({"default": true}))
            .with_attribute("email", json!({"default": "ada@example.com"}))
            .with_attribute("website", json!({"default": "https://example.com"}))
            .with_attribute("since", json!({"default": "2020-01-01T00:00:00.000Z"}))
            .with_attribute("skills", json!({"default": ["rust", "sql"]}));

        let doc = AttributeFlattener::default().flatten(&[member], &schema).unwrap();
        let attrs = attrs(&doc);
        assert_eq!(attrs["obj_isHireable"]["bool_default"], json!(true));
        assert_eq!(attrs["obj_email"]["string_default"], json!("ada@example.com"));
        assert_eq!(attrs["obj_website"]["string_default"], json!("https://example.com"));
        assert!(attrs["obj_since"].get("date_default").is_some());
        assert_eq!(attrs["obj_skills"]["string_arr_default"], json!(["rust", "sql"]));
    }

    #[test]
    fn test_special_attribute_serialized_to_text() {
        let schema = AttributeSchema::from_typed([("bio", AttributeType::Special)]);
        let member = snapshot("s-1").with_attribute("bio", json!({"default": "hi"}));

        let doc = AttributeFlattener::default().flatten(&[member], &schema).unwrap();
        assert_eq!(attrs(&doc)["string_bio"], json!(r#"{"default":"hi"}"#));
        assert!(attrs(&doc).get("obj_bio").is_none());
    }

    #[test]
    fn test_scalar_bag_value_is_default() {
        let schema = AttributeSchema::from_typed([("location", AttributeType::String)]);
        let member = snapshot("s-1").with_attribute("location", json!("Berlin"));

        let doc = AttributeFlattener::default().flatten(&[member], &schema).unwrap();
        assert_eq!(attrs(&doc)["obj_location"], json!({"string_default": "Berlin"}));
    }

    #[test]
    fn test_unknown_and_absent_attributes_skipped() {
        let schema = AttributeSchema::from_typed([("location", AttributeType::String)]);
        let member = snapshot("s-1").with_attribute("undeclared", json!({"default": 1}));

        let doc = AttributeFlattener::default().flatten(&[member], &schema).unwrap();
        assert!(attrs(&doc).is_empty());
    }

    #[test]
    fn test_null_attribute_values_skipped() {
        let schema = AttributeSchema::from_typed([
            ("location", AttributeType::String),
            ("karma", AttributeType::Number),
            ("bio", AttributeType::Special),
        ]);
        let member = snapshot("s-1")
            .with_attribute("location", Value::Null)
            .with_attribute("karma", json!({"default": null, "crm": 7}))
            .with_attribute("bio", Value::Null);

        let doc = AttributeFlattener::default().flatten(&[member], &schema).unwrap();
        assert!(attrs(&doc).get("obj_location").is_none());
        assert!(attrs(&doc).get("string_bio").is_none());
        assert_eq!(attrs(&doc)["obj_karma"], json!({"float_crm": 7}));
    }

    #[test]
    fn test_string_values_trimmed_on_char_boundary() {
        let schema = AttributeSchema::from_typed([("bio", AttributeType::String)]);
        // "é" is two bytes; a 5-byte budget must not split the third one.
        let member = snapshot("s-1").with_attribute("bio", json!({"default": "ééé"}));

        let doc = AttributeFlattener::new(5).flatten(&[member], &schema).unwrap();
        assert_eq!(attrs(&doc)["obj_bio"]["string_default"], json!("éé"));
    }

    #[test]
    fn test_trim_to_bytes() {
        assert_eq!(trim_to_bytes("hello", 10), "hello");
        assert_eq!(trim_to_bytes("hello", 3), "hel");
        assert_eq!(trim_to_bytes("aé", 2), "a");
        assert_eq!(trim_to_bytes("", 0), "");
    }

    #[test]
    fn test_segments_in_input_order_with_identity_from_first() {
        let mut first = snapshot("s-2");
        first.identities.push(MemberIdentity::new("github", "ada"));
        first.activity_count = 3;
        let mut second = snapshot("s-1");
        second.display_name = "Ignored".to_string();
        second.tags.push(MemberTag {
            id: "tag-1".to_string(),
            name: "core".to_string(),
        });

        let doc = AttributeFlattener::default()
            .flatten(&[first, second], &AttributeSchema::default())
            .unwrap();

        assert_eq!(doc.id, "m-1");
        assert_eq!(doc.field("string_displayName"), Some(&json!("Ada")));
        assert_eq!(doc.field("uuid_tenantId"), Some(&json!("t-1")));
        assert_eq!(doc.field("date_joinedAt"), Some(&json!("2024-01-29T10:00:00.000Z")));
        assert_eq!(
            doc.field("obj_arr_identities"),
            Some(&json!([{"string_platform": "github", "string_username": "ada"}]))
        );

        let segments = doc.field("obj_arr_segments").and_then(Value::as_array).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0]["uuid_segmentId"], "s-2");
        assert_eq!(segments[0]["int_activityCount"], 3);
        assert_eq!(segments[1]["uuid_segmentId"], "s-1");
        assert_eq!(
            segments[1]["obj_arr_tags"],
            json!([{"uuid_id": "tag-1", "string_name": "core"}])
        );
    }

    #[test]
    fn test_organization_entry_shape() {
        let mut member = snapshot("s-1");
        member.organizations.push(MemberOrganization {
            id: "org-1".to_string(),
            display_name: "Acme".to_string(),
            logo: None,
            title: Some("Engineer".to_string()),
            date_start: Some(Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap()),
            date_end: None,
        });

        let doc = AttributeFlattener::default()
            .flatten(&[member], &AttributeSchema::default())
            .unwrap();
        let segments = doc.field("obj_arr_segments").and_then(Value::as_array).unwrap();
        assert_eq!(
            segments[0]["obj_arr_organizations"][0],
            json!({
                "uuid_id": "org-1",
                "string_displayName": "Acme",
                "string_logo": null,
                "obj_memberOrganizations": {
                    "string_title": "Engineer",
                    "date_dateStart": "2021-03-01T00:00:00.000Z",
                    "date_dateEnd": null
                }
            })
        );
    }

    #[test]
    fn test_flatten_is_byte_identical_across_calls() {
        let schema = AttributeSchema::from_typed([
            ("location", AttributeType::String),
            ("bio", AttributeType::Special),
        ]);
        let member = snapshot("s-1")
            .with_attribute("location", json!({"default": "Berlin", "github": "Berlin, DE"}))
            .with_attribute("bio", json!({"default": "hi", "linkedin": "hello"}));
        let flattener = AttributeFlattener::default();

        let a = flattener.flatten(&[member.clone(), snapshot("s-2")], &schema).unwrap();
        let b = flattener.flatten(&[member, snapshot("s-2")], &schema).unwrap();
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = AttributeFlattener::default().flatten(&[], &AttributeSchema::default());
        assert!(matches!(result, Err(MemberError::InvalidInput(_))));
    }

    #[test]
    fn test_mixed_members_rejected() {
        let mut other = snapshot("s-1");
        other.id = "m-2".to_string();
        let result =
            AttributeFlattener::default().flatten(&[snapshot("s-1"), other], &AttributeSchema::default());
        assert!(matches!(result, Err(MemberError::InvalidInput(_))));
    }

    #[test]
    fn test_unknown_type_yields_no_document() {
        let definitions = vec![AttributeDefinition::new("geo", "GEO_POINT")];
        let result = AttributeSchema::from_definitions(&definitions);
        assert!(matches!(
            result,
            Err(MemberError::UnmappedAttributeType { .. })
        ));
    }
}
