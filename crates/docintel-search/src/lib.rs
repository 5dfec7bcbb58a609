//! # docintel-search
//!
//! Tag and facet search index for DocIntel using Tantivy.
//!
//! The index is a rebuildable projection of the entity store. Tags are
//! denormalized with their facet's title and prefix so a tag document can
//! be displayed and searched without a store round trip.
//!
//! ## Features
//! - Embedded Tantivy index with MmapDirectory for persistence, or in RAM
//! - Upsert-by-key writes and idempotent deletes per collection
//! - Lookups by id and collection counts
//! - BM25 keyword search over tag labels, friendly names and keywords

pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod schema;
pub mod searcher;

pub use document::{doc_to_facet, doc_to_tag, facet_to_doc, tag_to_doc, IndexedFacet, IndexedTag};
pub use error::SearchError;
pub use index::{SearchIndex, SearchIndexConfig, DEFAULT_WRITER_MEMORY_MB};
pub use indexer::SearchIndexer;
pub use schema::{build_taxonomy_schema, Collection, SearchSchema};
pub use searcher::{IndexSearcher, TagHit};
