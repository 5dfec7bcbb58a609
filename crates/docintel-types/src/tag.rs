//! Tag type.
//!
//! Tags are labeled markers attached to documents. Every tag belongs to
//! exactly one facet, whose prefix namespaces the tag's friendly name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::facet::Facet;

/// A tag as stored in the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier
    pub tag_id: Uuid,

    /// Display label (e.g. "Emotet")
    pub label: String,

    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,

    /// Additional terms only used for search
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Terms used for pattern-based extraction from document text
    #[serde(default)]
    pub extraction_keywords: Vec<String>,

    /// Background color used by the UI (e.g. "bg-danger")
    #[serde(default)]
    pub background_color: Option<String>,

    /// Owning facet
    pub facet_id: Uuid,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub creation_date: DateTime<Utc>,

    /// Last time the tag record itself changed
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub modification_date: DateTime<Utc>,

    /// Last time the tag was written to the search index.
    /// `None` means never indexed (always stale).
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_index_date: Option<DateTime<Utc>>,
}

impl Tag {
    /// Create a new, never indexed tag.
    pub fn new(tag_id: Uuid, label: impl Into<String>, facet_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            tag_id,
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            extraction_keywords: Vec::new(),
            background_color: None,
            facet_id,
            creation_date: now,
            modification_date: now,
            last_index_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_extraction_keywords(mut self, keywords: Vec<String>) -> Self {
        self.extraction_keywords = keywords;
        self
    }

    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }

    pub fn with_modification_date(mut self, date: DateTime<Utc>) -> Self {
        self.modification_date = date;
        self
    }

    pub fn with_last_index_date(mut self, date: DateTime<Utc>) -> Self {
        self.last_index_date = Some(date);
        self
    }

    /// Display form of the tag: `prefix:label`, or `label` when the facet
    /// has no prefix.
    pub fn friendly_name(&self, facet: &Facet) -> String {
        match facet.prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, self.label),
            _ => self.label.clone(),
        }
    }

    /// Forget the last index date so the next sweep picks the tag up.
    pub fn mark_for_reindex(&mut self) {
        self.last_index_date = None;
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

/// A tag resolved together with its owning facet.
///
/// This is what the store returns for "fetch tag, include facet".
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTag {
    pub tag: Tag,
    pub facet: Facet,
}

impl ResolvedTag {
    pub fn friendly_name(&self) -> String {
        self.tag.friendly_name(&self.facet)
    }
}

/// Association between a tag and a document, carrying the document date
/// used by the staleness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: Uuid,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub document_date: DateTime<Utc>,
}

impl DocumentRef {
    pub fn new(document_id: Uuid, document_date: DateTime<Utc>) -> Self {
        Self {
            document_id,
            document_date,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facet_with_prefix(prefix: Option<&str>) -> Facet {
        let mut facet = Facet::new(Uuid::new_v4(), "Malware");
        facet.prefix = prefix.map(str::to_string);
        facet
    }

    #[test]
    fn test_friendly_name_with_prefix() {
        let facet = facet_with_prefix(Some("malware"));
        let tag = Tag::new(Uuid::new_v4(), "Emotet", facet.facet_id);
        assert_eq!(tag.friendly_name(&facet), "malware:Emotet");
    }

    #[test]
    fn test_friendly_name_without_prefix() {
        let facet = facet_with_prefix(None);
        let tag = Tag::new(Uuid::new_v4(), "Emotet", facet.facet_id);
        assert_eq!(tag.friendly_name(&facet), "Emotet");

        let blank = facet_with_prefix(Some("  "));
        assert_eq!(tag.friendly_name(&blank), "Emotet");
    }

    #[test]
    fn test_new_tag_is_never_indexed() {
        let tag = Tag::new(Uuid::new_v4(), "APT28", Uuid::new_v4());
        assert!(tag.last_index_date.is_none());
        assert_eq!(tag.creation_date, tag.modification_date);
    }

    #[test]
    fn test_mark_for_reindex() {
        let mut tag = Tag::new(Uuid::new_v4(), "APT28", Uuid::new_v4()).with_last_index_date(Utc::now());
        assert!(tag.last_index_date.is_some());
        tag.mark_for_reindex();
        assert!(tag.last_index_date.is_none());
    }

    #[test]
    fn test_tag_bytes_keep_missing_index_date() {
        let tag = Tag::new(Uuid::new_v4(), "Lazarus", Uuid::new_v4())
            .with_keywords(vec!["hidden cobra".to_string()]);
        let decoded = Tag::from_bytes(&tag.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.tag_id, tag.tag_id);
        assert_eq!(decoded.keywords, tag.keywords);
        assert!(decoded.last_index_date.is_none());
    }
}
