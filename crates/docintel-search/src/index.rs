//! Opening the tag/facet index, on disk or in RAM.

use std::path::PathBuf;

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info};

use crate::error::SearchError;
use crate::schema::{build_taxonomy_schema, SearchSchema};

/// Writer heap budget in MB unless configured otherwise.
pub const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Present once a directory index has been created.
const META_FILE: &str = "meta.json";

#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub index_path: PathBuf,
    pub writer_memory_mb: usize,
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }
}

/// The index handle plus the resolved field handles of its schema.
pub struct SearchIndex {
    index: Index,
    schema: SearchSchema,
    writer_memory_mb: usize,
}

impl SearchIndex {
    /// Open the index directory, creating it with the taxonomy schema when
    /// no index exists there yet.
    ///
    /// An existing index whose schema lacks taxonomy fields is rejected
    /// with `SchemaMismatch`; run a rebuild into a fresh directory.
    pub fn open_or_create(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let path = &config.index_path;
        let index = if path.join(META_FILE).exists() {
            Index::open_in_dir(path)?
        } else {
            std::fs::create_dir_all(path)?;
            Index::create_in_dir(path, build_taxonomy_schema().schema().clone())?
        };

        let schema = SearchSchema::from_schema(index.schema())?;
        info!(path = %path.display(), "Opened tag/facet index");

        Ok(Self {
            index,
            schema,
            writer_memory_mb: config.writer_memory_mb,
        })
    }

    /// In-memory index for tests and dry runs.
    pub fn create_in_ram() -> Self {
        let schema = build_taxonomy_schema();
        Self {
            index: Index::create_in_ram(schema.schema().clone()),
            schema,
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn schema(&self) -> &SearchSchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Tantivy allows one writer per index; share it through `SearchIndexer`.
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let writer = self.index.writer(self.writer_memory_mb * 1024 * 1024)?;
        debug!(memory_mb = self.writer_memory_mb, "Created index writer");
        Ok(writer)
    }

    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?)
    }
}
