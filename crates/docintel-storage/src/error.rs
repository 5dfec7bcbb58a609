//! Storage layer error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tag references a facet that does not exist
    #[error("Tag {tag_id} references missing facet {facet_id}")]
    DanglingFacet { tag_id: Uuid, facet_id: Uuid },

    /// A merge named the same record as retained and removed
    #[error("Cannot merge {0} into itself")]
    SelfMerge(String),

    /// Write lock poisoned by a panicking writer
    #[error("Write lock poisoned: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
