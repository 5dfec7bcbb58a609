//! Facet type.
//!
//! A facet is a named namespace grouping related tags ("malware",
//! "actor", ...). Its prefix is embedded in every owned tag's friendly name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A facet as stored in the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    /// Unique identifier
    pub facet_id: Uuid,

    /// Display title (e.g. "Malware Families")
    pub title: String,

    /// Short namespace for tag friendly names (e.g. "malware")
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Documents must carry at least one tag of a mandatory facet
    #[serde(default)]
    pub mandatory: bool,

    /// Hidden facets are not displayed in the UI
    #[serde(default)]
    pub hidden: bool,

    /// Regular expression used to extract tags from document text
    #[serde(default)]
    pub extraction_regex: Option<String>,

    /// Whether extraction runs automatically on ingestion
    #[serde(default)]
    pub auto_extract: bool,

    /// Expression used to normalize extracted labels
    #[serde(default)]
    pub tag_normalization: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub creation_date: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub modification_date: DateTime<Utc>,

    /// Last time the facet was written to the search index
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_index_date: Option<DateTime<Utc>>,
}

impl Facet {
    /// Create a new facet with no prefix.
    pub fn new(facet_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            facet_id,
            title: title.into(),
            prefix: None,
            description: None,
            mandatory: false,
            hidden: false,
            extraction_regex: None,
            auto_extract: false,
            tag_normalization: None,
            creation_date: now,
            modification_date: now,
            last_index_date: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_extraction(mut self, regex: impl Into<String>, auto_extract: bool) -> Self {
        self.extraction_regex = Some(regex.into());
        self.auto_extract = auto_extract;
        self
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
