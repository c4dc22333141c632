//! Segment-scoped member snapshots.
//!
//! A member appears once per segment it is active in. Identity fields are the same in
//! every snapshot of a member; the aggregates (organizations, tags, activity) are
//! computed per segment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A member identity on an external platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub platform: String,
    pub username: String,
}

impl MemberIdentity {
    pub fn new(platform: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            username: username.into(),
        }
    }
}

/// Organization a member belongs to within a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberOrganization {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub logo: Option<String>,
    /// Role held at the organization
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_end: Option<DateTime<Utc>>,
}

/// Tag attached to a member within a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTag {
    pub id: String,
    pub name: String,
}

/// One row per (member, segment) pair as read from the member store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    /// Member id, shared by all snapshots of the member
    pub id: String,

    pub tenant_id: String,

    /// Segment this snapshot's aggregates were computed for
    pub segment_id: String,

    pub display_name: String,

    #[serde(default)]
    pub emails: Vec<String>,

    #[serde(default)]
    pub score: Option<i64>,

    #[serde(default)]
    pub last_enriched: Option<DateTime<Utc>>,

    pub joined_at: DateTime<Utc>,

    #[serde(default)]
    pub total_reach: Option<i64>,

    #[serde(default)]
    pub number_of_open_source_contributions: Option<i64>,

    /// Free-form attribute bag keyed by attribute name.
    ///
    /// Non-special attributes hold an object of per-source values with a `default`
    /// key, e.g. `{"default": "Berlin", "github": "Berlin, DE"}`.
    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub identities: Vec<MemberIdentity>,

    #[serde(default)]
    pub to_merge_ids: Vec<String>,

    #[serde(default)]
    pub no_merge_ids: Vec<String>,

    #[serde(default)]
    pub organizations: Vec<MemberOrganization>,

    #[serde(default)]
    pub tags: Vec<MemberTag>,

    /// Platforms the member was active on in this segment
    #[serde(default)]
    pub active_on: Vec<String>,

    #[serde(default)]
    pub activity_count: i64,

    #[serde(default)]
    pub activity_types: Vec<String>,

    #[serde(default)]
    pub active_days_count: i64,

    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,

    #[serde(default)]
    pub average_sentiment: Option<f64>,
}

impl MemberSnapshot {
    /// Create a snapshot with empty aggregates.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        segment_id: impl Into<String>,
        display_name: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            segment_id: segment_id.into(),
            display_name: display_name.into(),
            emails: Vec::new(),
            score: None,
            last_enriched: None,
            joined_at,
            total_reach: None,
            number_of_open_source_contributions: None,
            attributes: Map::new(),
            identities: Vec::new(),
            to_merge_ids: Vec::new(),
            no_merge_ids: Vec::new(),
            organizations: Vec::new(),
            tags: Vec::new(),
            active_on: Vec::new(),
            activity_count: 0,
            activity_types: Vec::new(),
            active_days_count: 0,
            last_active: None,
            average_sentiment: None,
        }
    }

    /// Set an attribute value in the bag.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
