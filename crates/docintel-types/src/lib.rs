//! # docintel-types
//!
//! Shared domain types for the DocIntel tag indexer.
//!
//! This crate defines the data structures exchanged between the entity
//! store, the search index and the indexing consumers:
//! - Tags and facets: the taxonomy entities that get projected into the index
//! - Change events: the messages published whenever a tag or facet mutates
//! - Automation users and claims: the identity an indexing context runs as
//! - Staleness policy: the predicate the reconciliation sweep relies on
//! - Settings: layered configuration for the indexer daemon

pub mod config;
pub mod error;
pub mod facet;
pub mod message;
pub mod staleness;
pub mod tag;
pub mod user;

pub use config::{NatsSettings, Settings};
pub use error::DocIntelError;
pub use facet::Facet;
pub use message::{
    ChangeEvent, FacetCreatedMessage, FacetMergedMessage, FacetRemovedMessage,
    FacetUpdatedMessage, TagCreatedMessage, TagMergedMessage, TagRemovedMessage,
    TagUpdatedMessage,
};
pub use staleness::{StalenessPolicy, MAX_SETTING_MINUTES};
pub use tag::{DocumentRef, ResolvedTag, Tag};
pub use user::{AutomationUser, Claims, Permission};
