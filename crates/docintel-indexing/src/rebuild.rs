//! Full index rebuild from the entity store.
//!
//! Walks every facet and every tag and writes their documents again,
//! optionally after clearing both collections. The index is a projection
//! of the entity store, so this is the recovery path for a lost or
//! corrupted index directory.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use docintel_types::Permission;

use crate::consumer::{log_failure, Stage};
use crate::context::{AmbientContext, ContextFactory};
use crate::error::{EntityKind, IndexingError};
use crate::log_event::LogEvent;
use crate::updater::{FacetIndexingUtility, TagIndexingUtility};

const OPERATION: &str = "rebuild";

/// Configuration for index rebuild operations.
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    /// Number of documents written between commits and progress reports.
    pub batch_size: usize,
    /// Whether to clear existing documents before rebuilding.
    pub clear_first: bool,
    /// Whether to continue on individual document errors.
    pub continue_on_error: bool,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            clear_first: true,
            continue_on_error: true,
        }
    }
}

impl RebuildConfig {
    /// Set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set whether to clear the index first.
    pub fn with_clear_first(mut self, clear: bool) -> Self {
        self.clear_first = clear;
        self
    }

    /// Set whether to continue on errors.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// Progress tracking for rebuild operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildProgress {
    /// Total entities handled.
    pub total_processed: u64,
    pub facets_indexed: u64,
    pub tags_indexed: u64,
    /// Number of errors encountered.
    pub errors: u64,
    /// Entities that vanished or were not readable during the rebuild.
    pub skipped: u64,
    /// Whether the rebuild completed successfully.
    pub completed: bool,
}

impl RebuildProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_facet(&mut self) {
        self.facets_indexed += 1;
        self.total_processed += 1;
    }

    pub fn record_tag(&mut self) {
        self.tags_indexed += 1;
        self.total_processed += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
        self.total_processed += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
        self.total_processed += 1;
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// Result of a rebuild operation.
#[derive(Debug)]
pub struct RebuildResult {
    pub progress: RebuildProgress,
    /// Time taken in milliseconds.
    pub elapsed_ms: u64,
}

/// Trait for receiving rebuild progress updates.
pub trait ProgressCallback: Send + Sync {
    /// Called after each committed batch.
    fn on_progress(&self, progress: &RebuildProgress);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _progress: &RebuildProgress) {}
}

/// A callback that logs progress at info level.
pub struct LoggingProgressCallback;

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, progress: &RebuildProgress) {
        info!(
            total = progress.total_processed,
            facets = progress.facets_indexed,
            tags = progress.tags_indexed,
            errors = progress.errors,
            "Rebuild progress"
        );
    }
}

#[derive(Default)]
struct Batch {
    facets: Vec<Uuid>,
    tags: Vec<Uuid>,
}

impl Batch {
    fn len(&self) -> usize {
        self.facets.len() + self.tags.len()
    }

    fn is_empty(&self) -> bool {
        self.facets.is_empty() && self.tags.is_empty()
    }
}

/// Rebuilds the tag and facet collections.
pub struct IndexRebuilder {
    factory: Arc<dyn ContextFactory>,
    tags: Arc<dyn TagIndexingUtility>,
    facets: Arc<dyn FacetIndexingUtility>,
    config: RebuildConfig,
}

impl IndexRebuilder {
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        tags: Arc<dyn TagIndexingUtility>,
        facets: Arc<dyn FacetIndexingUtility>,
        config: RebuildConfig,
    ) -> Self {
        Self {
            factory,
            tags,
            facets,
            config,
        }
    }

    pub async fn rebuild(&self, progress_callback: &dyn ProgressCallback) -> Result<RebuildResult, IndexingError> {
        let started = Instant::now();
        let ctx = self.factory.new_scope().await?;
        let mut progress = RebuildProgress::new();

        // Clearing needs the same rights as writing every document back.
        ctx.store().require(Permission::IndexTags, EntityKind::Tag, Uuid::nil())?;
        ctx.store().require(Permission::IndexFacets, EntityKind::Facet, Uuid::nil())?;

        info!(clear_first = self.config.clear_first, "Starting index rebuild...");

        if self.config.clear_first {
            self.tags.clear().await?;
            self.facets.clear().await?;
            self.tags.commit().await?;
            self.facets.commit().await?;
        }

        let mut batch = Batch::default();

        let facets = ctx.store().list_facets().await?;
        info!(count = facets.len(), "Found facets to index");
        for facet in facets {
            match self.facets.update(&facet).await {
                Ok(()) => batch.facets.push(facet.facet_id),
                Err(e) => self.on_error(&mut progress, EntityKind::Facet, facet.facet_id, e)?,
            }
            if batch.len() >= self.config.batch_size {
                self.flush(&ctx, std::mem::take(&mut batch), &mut progress).await?;
                progress_callback.on_progress(&progress);
            }
        }

        let tags = ctx.store().list_tags().await?;
        info!(count = tags.len(), "Found tags to index");
        for tag in tags {
            let written = match ctx.store().get_tag_with_facet(tag.tag_id).await {
                Ok(resolved) => self.tags.update(&resolved).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => batch.tags.push(tag.tag_id),
                Err(e) => self.on_error(&mut progress, EntityKind::Tag, tag.tag_id, e)?,
            }
            if batch.len() >= self.config.batch_size {
                self.flush(&ctx, std::mem::take(&mut batch), &mut progress).await?;
                progress_callback.on_progress(&progress);
            }
        }

        self.flush(&ctx, batch, &mut progress).await?;
        progress.mark_completed();
        progress_callback.on_progress(&progress);

        info!(
            facets = progress.facets_indexed,
            tags = progress.tags_indexed,
            skipped = progress.skipped,
            errors = progress.errors,
            "Index rebuild complete"
        );

        Ok(RebuildResult {
            progress,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn on_error(
        &self,
        progress: &mut RebuildProgress,
        kind: EntityKind,
        id: Uuid,
        err: IndexingError,
    ) -> Result<(), IndexingError> {
        if log_failure(OPERATION, Stage::Write, kind, id, &err) {
            progress.record_skip();
            Ok(())
        } else if self.config.continue_on_error {
            progress.record_error();
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Commit a batch and stamp what it wrote. A failed commit aborts the
    /// rebuild: nothing after it could become visible either.
    async fn flush(&self, ctx: &AmbientContext, batch: Batch, progress: &mut RebuildProgress) -> Result<(), IndexingError> {
        if batch.is_empty() {
            return Ok(());
        }

        if !batch.tags.is_empty() {
            self.tags.commit().await?;
        }
        if !batch.facets.is_empty() {
            self.facets.commit().await?;
        }

        let now = Utc::now();
        for facet_id in batch.facets {
            match ctx.store().stamp_facet(facet_id, now).await {
                Ok(()) => progress.record_facet(),
                Err(e) => {
                    self.on_error(progress, EntityKind::Facet, facet_id, e)?;
                }
            }
        }

        if batch.tags.is_empty() {
            return Ok(());
        }
        let written = batch.tags.len();
        match ctx.store().stamp_tags(batch.tags, now).await {
            Ok(missing) => {
                for _ in 0..written - missing.len() {
                    progress.record_tag();
                }
                for tag_id in missing {
                    progress.record_skip();
                    self.tags.remove(tag_id).await?;
                }
            }
            Err(e) => {
                warn!(
                    log_event = %LogEvent::StampFailed,
                    operation = OPERATION,
                    tags = written,
                    error = ?e,
                    "Failed to stamp rebuilt tags"
                );
                if !self.config.continue_on_error {
                    return Err(e);
                }
                for _ in 0..written {
                    progress.record_error();
                }
            }
        }
        Ok(())
    }
}
