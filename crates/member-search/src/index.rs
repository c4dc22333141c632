//! On-disk location of the member index.
//!
//! One directory holds one member index. A directory that already holds an index
//! with a different schema is rejected rather than served. Readers handed out
//! here never reload on their own; whoever commits reloads, so a cleanup scan
//! sees exactly the writes acknowledged before it started.

use std::fs;
use std::path::PathBuf;

use tantivy::directory::MmapDirectory;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use tracing::{debug, info};

use crate::error::SearchError;
use crate::schema::{build_member_schema, MemberSchema};

const DEFAULT_WRITER_BUDGET_MB: usize = 50;

/// Where the member index lives and how much memory its writer may buffer.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub index_path: PathBuf,
    /// Writer buffer in MB; documents are flushed to a segment when it fills
    pub writer_budget_mb: usize,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self::new("./member-index")
    }
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_budget_mb: DEFAULT_WRITER_BUDGET_MB,
        }
    }

    pub fn with_writer_budget_mb(mut self, mb: usize) -> Self {
        self.writer_budget_mb = mb;
        self
    }
}

/// The member index directory with its resolved field handles.
pub struct MemberSearchIndex {
    index: Index,
    schema: MemberSchema,
    config: SearchIndexConfig,
}

impl MemberSearchIndex {
    /// Open the member index at the configured path, creating it when the
    /// directory is empty.
    pub fn open_or_create(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let path = &config.index_path;
        fs::create_dir_all(path)?;
        let existed = path.join("meta.json").exists();

        let directory = MmapDirectory::open(path).map_err(TantivyError::from)?;
        let index = Index::open_or_create(directory, build_member_schema().schema().clone())
            .map_err(|e| match e {
                TantivyError::SchemaError(reason) => SearchError::SchemaMismatch(format!(
                    "{} at {}",
                    reason,
                    path.display()
                )),
                other => SearchError::Tantivy(other),
            })?;
        let schema = MemberSchema::from_schema(index.schema())?;

        if existed {
            debug!(path = ?path, "Opened member index");
        } else {
            info!(path = ?path, "Created member index");
        }

        Ok(Self {
            index,
            schema,
            config,
        })
    }

    pub fn schema(&self) -> &MemberSchema {
        &self.schema
    }

    /// The single writer of this index.
    ///
    /// Tantivy allows one writer per directory across processes; a second call
    /// while the first writer is alive fails with [`SearchError::IndexLocked`].
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let budget = self.config.writer_budget_mb * 1024 * 1024;
        let writer = self
            .index
            .writer_with_num_threads(1, budget)
            .map_err(|e| match e {
                TantivyError::LockFailure(..) => SearchError::IndexLocked(format!(
                    "{} ({})",
                    self.config.index_path.display(),
                    e
                )),
                other => SearchError::Tantivy(other),
            })?;
        debug!(budget_mb = self.config.writer_budget_mb, "Member index writer acquired");
        Ok(writer)
    }

    /// A reader pinned to the last commit until `reload` is called on it.
    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?)
    }
}
