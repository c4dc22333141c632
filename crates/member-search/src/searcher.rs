//! Tenant scans over the member index.
//!
//! Scans are filtered on the tenant id and ordered ascending by join time. Paging
//! uses search-after on the join time: the next page starts strictly after the last
//! join time seen.

use std::ops::Bound;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{IndexReader, Order, TantivyDocument, Term};
use tracing::debug;

use crate::document::{doc_to_member, StoredMember};
use crate::error::SearchError;
use crate::index::MemberSearchIndex;
use crate::schema::{MemberSchema, JOINED_AT};

/// Read access to the member index.
pub struct MemberSearcher {
    reader: IndexReader,
    schema: MemberSchema,
}

impl MemberSearcher {
    /// Create a new searcher from a MemberSearchIndex.
    pub fn new(index: &MemberSearchIndex) -> Result<Self, SearchError> {
        let reader = index.reader()?;
        let schema = index.schema().clone();

        Ok(Self { reader, schema })
    }

    /// Reload the reader to see recent commits.
    pub fn reload(&self) -> Result<(), SearchError> {
        self.reader.reload()?;
        debug!("Reloaded member reader");
        Ok(())
    }

    fn tenant_query(&self, tenant_id: &str) -> Box<dyn Query> {
        let term = Term::from_field_text(self.schema.tenant_id, tenant_id);
        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
    }

    /// One page of a tenant's documents ordered by join time.
    ///
    /// `after_ms` excludes every document joined at or before it.
    pub fn scan_tenant(
        &self,
        tenant_id: &str,
        after_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<StoredMember>, SearchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query: Box<dyn Query> = match after_ms {
            Some(after) => {
                let lower = Term::from_field_i64(self.schema.joined_at, after);
                let range = RangeQuery::new(Bound::Excluded(lower), Bound::Unbounded);
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, self.tenant_query(tenant_id)),
                    (Occur::Must, Box::new(range)),
                ]))
            }
            None => self.tenant_query(tenant_id),
        };

        let searcher = self.reader.searcher();
        let collector = TopDocs::with_limit(limit).order_by_fast_field::<i64>(JOINED_AT, Order::Asc);
        let top_docs = searcher.search(&query, &collector)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (_joined_at, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(doc_to_member(&self.schema, &doc)?);
        }

        debug!(
            tenant_id,
            after_ms = ?after_ms,
            hits = results.len(),
            "Scanned tenant page"
        );
        Ok(results)
    }

    /// Fetch one document by member id.
    pub fn get(&self, member_id: &str) -> Result<Option<StoredMember>, SearchError> {
        let term = Term::from_field_text(self.schema.doc_id, member_id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;

        match top_docs.into_iter().next() {
            Some((_score, doc_address)) => {
                let doc: TantivyDocument = searcher.doc(doc_address)?;
                Ok(Some(doc_to_member(&self.schema, &doc)?))
            }
            None => Ok(None),
        }
    }

    /// Number of documents indexed for a tenant.
    pub fn count_tenant(&self, tenant_id: &str) -> Result<usize, SearchError> {
        let searcher = self.reader.searcher();
        let count = searcher.search(&self.tenant_query(tenant_id), &Count)?;
        Ok(count)
    }

    /// Get the number of indexed documents.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
