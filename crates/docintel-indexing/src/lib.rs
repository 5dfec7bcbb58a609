//! Tag and facet indexing core for DocIntel.
//!
//! This crate keeps the search index consistent with the entity store
//! while tags and facets are created, updated, removed and merged.
//!
//! ## Key Components
//!
//! - [`TagIndexingUtility`] / [`FacetIndexingUtility`]: document writes
//!   against the index, with Tantivy implementations
//! - [`ContextFactory`]: per-operation [`AmbientContext`] bound to the
//!   automation identity
//! - [`IndexingConsumer`]: translates one change event into index mutations
//! - [`ConsumerRunner`]: bounded worker pool over an event source
//! - [`ReconciliationSweeper`]: periodic re-indexing of stale tags
//! - [`IndexRebuilder`]: full rebuild of both collections
//!
//! ## Consistency model
//!
//! The index is a projection that may lag behind the entity store:
//! 1. Events are handled at least once and in any order
//! 2. Writes re-resolve the entity first, so a late update for a deleted
//!    tag finds nothing to index
//! 3. Removes are idempotent
//! 4. The last-index date only advances after a successful commit, so
//!    anything that failed is picked up by the next sweep
//!
//! ## Example
//!
//! ```ignore
//! use docintel_indexing::{ConsumerRunner, IndexingConsumer};
//!
//! let consumer = Arc::new(IndexingConsumer::new(factory, tag_utility, facet_utility));
//! let runner = ConsumerRunner::new(consumer, settings.max_concurrent_messages);
//! let stats = runner.run(source, cancel).await?;
//! ```

mod blocking;
pub mod consumer;
pub mod context;
pub mod error;
pub mod log_event;
pub mod rebuild;
pub mod runner;
pub mod sweeper;
pub mod tantivy_updater;
pub mod updater;

#[cfg(test)]
mod test_support;

pub use consumer::IndexingConsumer;
pub use context::{AmbientContext, AutomationContextFactory, ContextFactory, ScopedStore};
pub use error::{EntityKind, IndexingError};
pub use log_event::LogEvent;
pub use rebuild::{
    IndexRebuilder, LoggingProgressCallback, NoOpProgressCallback, ProgressCallback,
    RebuildConfig, RebuildProgress, RebuildResult,
};
pub use runner::{ConsumerRunner, RunnerStats};
pub use sweeper::{ReconciliationSweeper, SweepResult};
pub use tantivy_updater::{TantivyFacetIndexingUtility, TantivyTagIndexingUtility};
pub use updater::{FacetIndexingUtility, TagIndexingUtility, UpdateResult};
