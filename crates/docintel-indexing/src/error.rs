//! Error types for the indexing core.
//!
//! Errors fall into the categories the consumer and the sweeper treat
//! differently:
//! - expected resolution failures (`NotFound`, `Unauthorized`), logged as
//!   warnings without detail
//! - transport failures (`IndexWrite`, `Timeout`, `Storage`), logged with
//!   full detail; the last-index date is not advanced
//! - `Configuration`, which aborts context creation

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use docintel_search::SearchError;
use docintel_storage::StorageError;
use docintel_types::Permission;

/// Kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Tag,
    Facet,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tag => "tag",
            EntityKind::Facet => "facet",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while indexing
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Entity does not exist (anymore)
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// Automation identity lacks a permission
    #[error("not allowed to access {kind} {id}: missing {permission}")]
    Unauthorized {
        kind: EntityKind,
        id: Uuid,
        permission: Permission,
    },

    /// Search index rejected a write or could not be reached
    #[error("Index write failed: {0}")]
    IndexWrite(String),

    /// A store or index call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Deployment misconfiguration, e.g. missing automation account
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Entity store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),

    /// Event source failure
    #[error("Event source error: {0}")]
    Source(String),
}

impl From<SearchError> for IndexingError {
    fn from(err: SearchError) -> Self {
        IndexingError::IndexWrite(err.to_string())
    }
}

impl IndexingError {
    /// Not-found and unauthorized outcomes are part of normal operation.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            IndexingError::NotFound { .. } | IndexingError::Unauthorized { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexingError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::new_v4();
        let err = IndexingError::NotFound {
            kind: EntityKind::Tag,
            id,
        };
        assert_eq!(err.to_string(), format!("tag {} not found", id));

        let err = IndexingError::Unauthorized {
            kind: EntityKind::Facet,
            id,
            permission: Permission::ViewFacets,
        };
        assert!(err.to_string().contains("missing view_facets"));

        let err = IndexingError::Timeout {
            operation: "tag index write",
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "tag index write timed out after 30s");
    }

    #[test]
    fn test_expected_errors() {
        let id = Uuid::new_v4();
        assert!(IndexingError::NotFound {
            kind: EntityKind::Tag,
            id
        }
        .is_expected());
        assert!(IndexingError::Unauthorized {
            kind: EntityKind::Tag,
            id,
            permission: Permission::IndexTags
        }
        .is_expected());
        assert!(!IndexingError::IndexWrite("connection refused".into()).is_expected());
        assert!(!IndexingError::Configuration("no user".into()).is_expected());
    }

    #[test]
    fn test_from_search_error() {
        let err: IndexingError = SearchError::IndexLocked("poisoned".into()).into();
        assert!(matches!(err, IndexingError::IndexWrite(_)));
    }
}
