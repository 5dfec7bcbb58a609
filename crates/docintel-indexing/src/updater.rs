//! Index update utilities for tags and facets.
//!
//! The utilities translate an entity into its index document and perform
//! the write. They carry no business rules and never swallow errors:
//! callers decide what a failure means.

use async_trait::async_trait;
use uuid::Uuid;

use docintel_types::{Facet, ResolvedTag};

use crate::error::IndexingError;

/// Writes tag documents to the search index.
#[async_trait]
pub trait TagIndexingUtility: Send + Sync {
    /// Write the document of a newly created tag.
    async fn add(&self, tag: &ResolvedTag) -> Result<(), IndexingError>;

    /// Overwrite the document of an existing tag (upsert).
    async fn update(&self, tag: &ResolvedTag) -> Result<(), IndexingError>;

    /// Delete the document of a tag. Absent ids are not an error.
    async fn remove(&self, tag_id: Uuid) -> Result<(), IndexingError>;

    /// Drop every tag document.
    async fn clear(&self) -> Result<(), IndexingError>;

    /// Make pending writes visible.
    async fn commit(&self) -> Result<(), IndexingError>;
}

/// Writes facet documents to the search index.
#[async_trait]
pub trait FacetIndexingUtility: Send + Sync {
    async fn add(&self, facet: &Facet) -> Result<(), IndexingError>;

    async fn update(&self, facet: &Facet) -> Result<(), IndexingError>;

    /// Delete the document of a facet. Absent ids are not an error.
    async fn remove(&self, facet_id: Uuid) -> Result<(), IndexingError>;

    async fn clear(&self) -> Result<(), IndexingError>;

    async fn commit(&self) -> Result<(), IndexingError>;
}

/// Outcome counters of handling one event, one sweep or one rebuild.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    /// Entities written or removed successfully
    pub processed: usize,
    /// Entities skipped for expected reasons (not found, unauthorized)
    pub skipped: usize,
    /// Entities that failed unexpectedly
    pub errors: usize,
}

impl UpdateResult {
    /// Create a new empty result.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: &UpdateResult) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }

    /// Check if any entity was processed successfully.
    pub fn has_updates(&self) -> bool {
        self.processed > 0
    }

    /// Total number of entities handled (success + skip + error).
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.errors
    }
}
