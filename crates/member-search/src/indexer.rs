//! Member indexer for writing documents to the Tantivy index.
//!
//! The indexer wraps IndexWriter with shared access via Arc<Mutex>.
//! Documents are not visible until commit() is called.

use std::sync::{Arc, Mutex};

use tantivy::{IndexWriter, Term};
use tracing::{debug, info, warn};

use member_types::FlattenedDocument;

use crate::document::member_to_doc;
use crate::error::SearchError;
use crate::index::MemberSearchIndex;
use crate::schema::MemberSchema;

/// Manages document write operations.
///
/// Every write replaces the whole document for its id.
pub struct MemberIndexer {
    writer: Arc<Mutex<IndexWriter>>,
    schema: MemberSchema,
}

impl MemberIndexer {
    /// Create a new indexer from a MemberSearchIndex.
    pub fn new(index: &MemberSearchIndex) -> Result<Self, SearchError> {
        let writer = index.writer()?;
        let schema = index.schema().clone();

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            schema,
        })
    }

    /// Insert or replace one member document.
    pub fn upsert(&self, member: &FlattenedDocument) -> Result<(), SearchError> {
        let doc = member_to_doc(&self.schema, member)?;

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_term(Term::from_field_text(self.schema.doc_id, &member.id));
        writer.add_document(doc)?;

        debug!(member_id = %member.id, "Indexed member");
        Ok(())
    }

    /// Insert or replace several member documents.
    ///
    /// All documents are converted before any is staged, so an invalid document
    /// leaves the writer untouched.
    pub fn upsert_batch(&self, members: &[FlattenedDocument]) -> Result<usize, SearchError> {
        let docs = members
            .iter()
            .map(|m| member_to_doc(&self.schema, m).map(|d| (m.id.as_str(), d)))
            .collect::<Result<Vec<_>, _>>()?;

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let mut count = 0;
        for (id, doc) in docs {
            writer.delete_term(Term::from_field_text(self.schema.doc_id, id));
            writer.add_document(doc)?;
            count += 1;
        }

        debug!(count, "Indexed member batch");
        Ok(count)
    }

    /// Delete a document by member id. Deleting an absent id is a no-op.
    pub fn delete(&self, member_id: &str) -> Result<(), SearchError> {
        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_term(Term::from_field_text(self.schema.doc_id, member_id));

        debug!(member_id, "Deleted member document");
        Ok(())
    }

    /// Commit pending changes to make them searchable.
    pub fn commit(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.commit()?;
        debug!(opstamp, "Committed index changes");
        Ok(opstamp)
    }

    /// Rollback uncommitted changes.
    pub fn rollback(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.rollback()?;
        warn!(opstamp, "Rolled back index changes");
        Ok(opstamp)
    }

    /// Drop every document. Used when rebuilding an index from scratch.
    pub fn clear(&self) -> Result<(), SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_all_documents()?;
        writer.commit()?;
        info!("Cleared member index");
        Ok(())
    }
}
