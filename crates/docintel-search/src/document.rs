//! Document mapping between domain types and Tantivy documents.
//!
//! `IndexedTag` and `IndexedFacet` are the denormalized projections kept
//! in the index. They are built from entity store records and read back
//! from stored fields, so a round trip through the index yields an equal
//! value.

use serde::Serialize;
use tantivy::schema::Value;
use tantivy::TantivyDocument;
use uuid::Uuid;

use docintel_types::{Facet, ResolvedTag};

use crate::error::SearchError;
use crate::schema::{Collection, SearchSchema};

/// Index projection of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedTag {
    pub tag_id: Uuid,
    pub label: String,
    pub friendly_name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub extraction_keywords: Vec<String>,
    pub background_color: Option<String>,
    pub facet_id: Uuid,
    pub facet_title: String,
    pub facet_prefix: Option<String>,
    pub modification_ms: i64,
}

impl IndexedTag {
    /// Project a tag together with its current facet.
    pub fn from_resolved(resolved: &ResolvedTag) -> Self {
        let tag = &resolved.tag;
        let facet = &resolved.facet;
        Self {
            tag_id: tag.tag_id,
            label: tag.label.clone(),
            friendly_name: resolved.friendly_name(),
            description: non_empty(tag.description.as_deref()),
            keywords: tag.keywords.clone(),
            extraction_keywords: tag.extraction_keywords.clone(),
            background_color: non_empty(tag.background_color.as_deref()),
            facet_id: facet.facet_id,
            facet_title: facet.title.clone(),
            facet_prefix: non_empty(facet.prefix.as_deref()),
            modification_ms: tag.modification_date.timestamp_millis(),
        }
    }
}

/// Index projection of a facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedFacet {
    pub facet_id: Uuid,
    pub title: String,
    pub prefix: Option<String>,
    pub description: Option<String>,
    pub mandatory: bool,
    pub hidden: bool,
    pub extraction_regex: Option<String>,
    pub auto_extract: bool,
    pub modification_ms: i64,
}

impl IndexedFacet {
    pub fn from_facet(facet: &Facet) -> Self {
        Self {
            facet_id: facet.facet_id,
            title: facet.title.clone(),
            prefix: non_empty(facet.prefix.as_deref()),
            description: non_empty(facet.description.as_deref()),
            mandatory: facet.mandatory,
            hidden: facet.hidden,
            extraction_regex: non_empty(facet.extraction_regex.as_deref()),
            auto_extract: facet.auto_extract,
            modification_ms: facet.modification_date.timestamp_millis(),
        }
    }
}

// Empty strings are not stored, so they read back as None.
fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

fn add_optional(doc: &mut TantivyDocument, field: tantivy::schema::Field, value: &Option<String>) {
    if let Some(value) = value {
        doc.add_text(field, value);
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Convert an `IndexedTag` to a Tantivy document.
pub fn tag_to_doc(schema: &SearchSchema, tag: &IndexedTag) -> TantivyDocument {
    let mut doc = TantivyDocument::default();
    doc.add_text(schema.collection, Collection::Tag.as_str());
    doc.add_text(schema.doc_key, Collection::Tag.doc_key(&tag.tag_id));
    doc.add_text(schema.doc_id, tag.tag_id.to_string());
    doc.add_text(schema.label, &tag.label);
    doc.add_text(schema.friendly_name, &tag.friendly_name);
    add_optional(&mut doc, schema.description, &tag.description);
    for keyword in &tag.keywords {
        doc.add_text(schema.keywords, keyword);
    }
    for keyword in &tag.extraction_keywords {
        doc.add_text(schema.extraction_keywords, keyword);
    }
    add_optional(&mut doc, schema.background_color, &tag.background_color);
    doc.add_text(schema.facet_id, tag.facet_id.to_string());
    doc.add_text(schema.facet_title, &tag.facet_title);
    add_optional(&mut doc, schema.facet_prefix, &tag.facet_prefix);
    doc.add_text(schema.modification_ms, tag.modification_ms.to_string());
    doc
}

/// Convert an `IndexedFacet` to a Tantivy document.
pub fn facet_to_doc(schema: &SearchSchema, facet: &IndexedFacet) -> TantivyDocument {
    let mut doc = TantivyDocument::default();
    doc.add_text(schema.collection, Collection::Facet.as_str());
    doc.add_text(schema.doc_key, Collection::Facet.doc_key(&facet.facet_id));
    doc.add_text(schema.doc_id, facet.facet_id.to_string());
    doc.add_text(schema.label, &facet.title);
    add_optional(&mut doc, schema.description, &facet.description);
    doc.add_text(schema.facet_id, facet.facet_id.to_string());
    add_optional(&mut doc, schema.facet_prefix, &facet.prefix);
    doc.add_text(schema.mandatory, bool_str(facet.mandatory));
    doc.add_text(schema.hidden, bool_str(facet.hidden));
    add_optional(&mut doc, schema.extraction_regex, &facet.extraction_regex);
    doc.add_text(schema.auto_extract, bool_str(facet.auto_extract));
    doc.add_text(schema.modification_ms, facet.modification_ms.to_string());
    doc
}

fn first_str(doc: &TantivyDocument, field: tantivy::schema::Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn all_str(doc: &TantivyDocument, field: tantivy::schema::Field) -> Vec<String> {
    doc.get_all(field)
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect()
}

fn required_uuid(doc: &TantivyDocument, field: tantivy::schema::Field, name: &str) -> Result<Uuid, SearchError> {
    let raw = first_str(doc, field)
        .ok_or_else(|| SearchError::InvalidDocument(format!("missing {}", name)))?;
    raw.parse()
        .map_err(|_| SearchError::InvalidDocument(format!("invalid {}: {}", name, raw)))
}

fn modification_ms(doc: &TantivyDocument, schema: &SearchSchema) -> i64 {
    first_str(doc, schema.modification_ms)
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Read an `IndexedTag` back from stored fields.
pub fn doc_to_tag(schema: &SearchSchema, doc: &TantivyDocument) -> Result<IndexedTag, SearchError> {
    Ok(IndexedTag {
        tag_id: required_uuid(doc, schema.doc_id, "doc_id")?,
        label: first_str(doc, schema.label).unwrap_or_default(),
        friendly_name: first_str(doc, schema.friendly_name).unwrap_or_default(),
        description: first_str(doc, schema.description),
        keywords: all_str(doc, schema.keywords),
        extraction_keywords: all_str(doc, schema.extraction_keywords),
        background_color: first_str(doc, schema.background_color),
        facet_id: required_uuid(doc, schema.facet_id, "facet_id")?,
        facet_title: first_str(doc, schema.facet_title).unwrap_or_default(),
        facet_prefix: first_str(doc, schema.facet_prefix),
        modification_ms: modification_ms(doc, schema),
    })
}

/// Read an `IndexedFacet` back from stored fields.
pub fn doc_to_facet(schema: &SearchSchema, doc: &TantivyDocument) -> Result<IndexedFacet, SearchError> {
    let flag = |field| first_str(doc, field).as_deref() == Some("true");
    Ok(IndexedFacet {
        facet_id: required_uuid(doc, schema.doc_id, "doc_id")?,
        title: first_str(doc, schema.label).unwrap_or_default(),
        prefix: first_str(doc, schema.facet_prefix),
        description: first_str(doc, schema.description),
        mandatory: flag(schema.mandatory),
        hidden: flag(schema.hidden),
        extraction_regex: first_str(doc, schema.extraction_regex),
        auto_extract: flag(schema.auto_extract),
        modification_ms: modification_ms(doc, schema),
    })
}
