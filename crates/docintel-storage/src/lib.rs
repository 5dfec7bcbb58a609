//! Entity store for the DocIntel tag indexer.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for tags, facets, associations and users
//! - A facet -> tags secondary index for facet-wide fan-out
//! - Tag -> document associations carrying document dates for staleness
//! - Targeted last-index stamp writes that never resurrect deleted records

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{FacetKey, FacetTagKey, TagDocumentKey, TagKey, UserKey};
