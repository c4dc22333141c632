//! The index client seam.
//!
//! [`IndexClient`] is the document side of the sync. Requests are shaped after the
//! scans the engine needs: one term filter, one sort key, a page size and an
//! optional search-after cursor. [`TantivyIndexClient`] serves them from the
//! embedded member index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use member_search::{MemberIndexer, MemberSearchIndex, MemberSearcher, StoredMember};
use member_types::{parse_date, FlattenedDocument, FIELD_JOINED_AT, FIELD_TENANT_ID};

use crate::error::SyncError;

/// Sort direction of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Exact match on one top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermFilter {
    pub field: String,
    pub value: String,
}

/// Sort on one top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// Search-after position of a join-time ordered scan.
///
/// The next page starts strictly after this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SyncCursor(pub DateTime<Utc>);

impl SyncCursor {
    /// Cursor positioned at a hit's projected join date.
    pub fn from_hit(hit: &SearchHit) -> Result<Self, SyncError> {
        let raw = hit
            .source
            .get(FIELD_JOINED_AT)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SyncError::Index(format!("hit {} has no {}", hit.id, FIELD_JOINED_AT))
            })?;
        Ok(Self(parse_date(raw)?))
    }
}

/// A paged, filtered, sorted search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub filter: TermFilter,
    pub sort: SortSpec,
    pub size: usize,
    pub search_after: Option<SyncCursor>,
    /// Top-level fields to return; `None` returns the whole document.
    pub source_fields: Option<Vec<String>>,
}

impl SearchRequest {
    /// All documents of a tenant, oldest join first.
    pub fn tenant_scan(tenant_id: impl Into<String>, size: usize) -> Self {
        Self {
            filter: TermFilter {
                field: FIELD_TENANT_ID.to_string(),
                value: tenant_id.into(),
            },
            sort: SortSpec {
                field: FIELD_JOINED_AT.to_string(),
                order: SortOrder::Asc,
            },
            size,
            search_after: None,
            source_fields: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<SyncCursor>) -> Self {
        self.search_after = cursor;
        self
    }

    pub fn with_source_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    /// Document body, restricted to the requested fields
    pub source: Map<String, Value>,
}

/// Keep only the requested top-level fields.
pub fn project_source(source: Map<String, Value>, fields: Option<&[String]>) -> Map<String, Value> {
    match fields {
        Some(fields) => source
            .into_iter()
            .filter(|(key, _)| fields.iter().any(|f| f == key))
            .collect(),
        None => source,
    }
}

/// Document store the engine writes flattened members into.
#[async_trait]
pub trait IndexClient: Send + Sync {
    async fn search(&self, index: &str, request: &SearchRequest)
        -> Result<Vec<SearchHit>, SyncError>;

    /// Write a batch of documents, replacing existing ones with the same id.
    async fn bulk_write(&self, index: &str, documents: &[FlattenedDocument])
        -> Result<(), SyncError>;

    /// Write one document, replacing an existing one with the same id.
    async fn write(&self, index: &str, document: &FlattenedDocument) -> Result<(), SyncError>;

    /// Delete a document. Deleting an absent id succeeds.
    async fn delete(&self, index: &str, id: &str) -> Result<(), SyncError>;
}

/// [`IndexClient`] over the embedded Tantivy member index.
///
/// Serves a single named index. Every write commits and reloads the reader, so a
/// write is visible to the next search.
pub struct TantivyIndexClient {
    name: String,
    indexer: MemberIndexer,
    searcher: MemberSearcher,
}

impl TantivyIndexClient {
    pub fn open(name: impl Into<String>, index: &MemberSearchIndex) -> Result<Self, SyncError> {
        Ok(Self {
            name: name.into(),
            indexer: MemberIndexer::new(index)?,
            searcher: MemberSearcher::new(index)?,
        })
    }

    /// Name of the served index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read access for status reporting.
    pub fn searcher(&self) -> &MemberSearcher {
        &self.searcher
    }

    fn check_index(&self, index: &str) -> Result<(), SyncError> {
        if index == self.name {
            Ok(())
        } else {
            Err(member_search::SearchError::UnknownIndex(index.to_string()).into())
        }
    }

    fn commit(&self) -> Result<(), SyncError> {
        self.indexer.commit()?;
        self.searcher.reload()?;
        Ok(())
    }
}

fn unsupported(reason: String) -> SyncError {
    member_search::SearchError::UnsupportedQuery(reason).into()
}

fn to_hit(member: StoredMember, fields: Option<&[String]>) -> SearchHit {
    SearchHit {
        id: member.id,
        source: project_source(member.source, fields),
    }
}

#[async_trait]
impl IndexClient for TantivyIndexClient {
    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, SyncError> {
        self.check_index(index)?;
        if request.filter.field != FIELD_TENANT_ID {
            return Err(unsupported(format!("filter on {}", request.filter.field)));
        }
        if request.sort.field != FIELD_JOINED_AT || request.sort.order != SortOrder::Asc {
            return Err(unsupported(format!(
                "sort on {} {:?}",
                request.sort.field, request.sort.order
            )));
        }

        let after_ms = request.search_after.map(|c| c.0.timestamp_millis());
        let members = self
            .searcher
            .scan_tenant(&request.filter.value, after_ms, request.size)?;

        let fields = request.source_fields.as_deref();
        Ok(members.into_iter().map(|m| to_hit(m, fields)).collect())
    }

    async fn bulk_write(
        &self,
        index: &str,
        documents: &[FlattenedDocument],
    ) -> Result<(), SyncError> {
        self.check_index(index)?;
        if documents.is_empty() {
            return Ok(());
        }
        let count = self.indexer.upsert_batch(documents)?;
        self.commit()?;
        debug!(index, count, "Bulk wrote documents");
        Ok(())
    }

    async fn write(&self, index: &str, document: &FlattenedDocument) -> Result<(), SyncError> {
        self.check_index(index)?;
        self.indexer.upsert(document)?;
        self.commit()
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), SyncError> {
        self.check_index(index)?;
        self.indexer.delete(id)?;
        self.commit()
    }
}
