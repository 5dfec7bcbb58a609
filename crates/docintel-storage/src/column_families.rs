//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - tags: Tag records keyed by id
//! - facets: Facet records keyed by id
//! - facet_tags: Facet -> tag membership index (empty values)
//! - tag_documents: Tag -> document associations with document dates
//! - users: Automation accounts keyed by username

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for tag records
pub const CF_TAGS: &str = "tags";

/// Column family name for facet records
pub const CF_FACETS: &str = "facets";

/// Column family name for the facet membership index
pub const CF_FACET_TAGS: &str = "facet_tags";

/// Column family name for tag/document associations
pub const CF_TAG_DOCUMENTS: &str = "tag_documents";

/// Column family name for automation accounts
pub const CF_USERS: &str = "users";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_TAGS, CF_FACETS, CF_FACET_TAGS, CF_TAG_DOCUMENTS, CF_USERS];

/// Associations are written far more often than they are read.
fn tag_documents_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_TAGS, Options::default()),
        ColumnFamilyDescriptor::new(CF_FACETS, Options::default()),
        ColumnFamilyDescriptor::new(CF_FACET_TAGS, Options::default()),
        ColumnFamilyDescriptor::new(CF_TAG_DOCUMENTS, tag_documents_options()),
        ColumnFamilyDescriptor::new(CF_USERS, Options::default()),
    ]
}
