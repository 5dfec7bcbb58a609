//! Tantivy schema definition for the tag and facet collections.
//!
//! Both collections live in one index:
//! - tag documents: label, friendly name, keywords and the owning facet
//! - facet documents: title, prefix and extraction settings

use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};

use crate::SearchError;

/// Collections stored in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tag,
    Facet,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tag => "tag",
            Collection::Facet => "facet",
        }
    }

    /// Parse from string, returning None for unknown collections.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tag" => Some(Collection::Tag),
            "facet" => Some(Collection::Facet),
            _ => None,
        }
    }

    /// Unique key of an entity inside the index, e.g. `tag:{uuid}`.
    pub fn doc_key(&self, id: &uuid::Uuid) -> String {
        format!("{}:{}", self.as_str(), id)
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown collection: {}", s))
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct SearchSchema {
    schema: Schema,
    /// "tag" or "facet" (STRING | STORED)
    pub collection: Field,
    /// Primary key `collection:id` (STRING)
    pub doc_key: Field,
    /// Entity id (STRING | STORED)
    pub doc_id: Field,
    /// Tag label or facet title (TEXT | STORED)
    pub label: Field,
    /// Tag friendly name `prefix:label` (TEXT | STORED)
    pub friendly_name: Field,
    pub description: Field,
    /// Search-only keywords, one value per keyword (TEXT | STORED)
    pub keywords: Field,
    /// Extraction keywords, one value per keyword (STRING | STORED)
    pub extraction_keywords: Field,
    pub background_color: Field,
    /// Owning facet for tags, the facet itself for facets (STRING | STORED)
    pub facet_id: Field,
    pub facet_title: Field,
    pub facet_prefix: Field,
    /// "true"/"false" (STRING | STORED)
    pub mandatory: Field,
    pub hidden: Field,
    pub extraction_regex: Field,
    pub auto_extract: Field,
    /// Entity modification date in milliseconds (STRING | STORED)
    pub modification_ms: Field,
}

fn field(schema: &Schema, name: &str) -> Result<Field, SearchError> {
    schema
        .get_field(name)
        .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
}

impl SearchSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a SearchSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        Ok(Self {
            collection: field(&schema, "collection")?,
            doc_key: field(&schema, "doc_key")?,
            doc_id: field(&schema, "doc_id")?,
            label: field(&schema, "label")?,
            friendly_name: field(&schema, "friendly_name")?,
            description: field(&schema, "description")?,
            keywords: field(&schema, "keywords")?,
            extraction_keywords: field(&schema, "extraction_keywords")?,
            background_color: field(&schema, "background_color")?,
            facet_id: field(&schema, "facet_id")?,
            facet_title: field(&schema, "facet_title")?,
            facet_prefix: field(&schema, "facet_prefix")?,
            mandatory: field(&schema, "mandatory")?,
            hidden: field(&schema, "hidden")?,
            extraction_regex: field(&schema, "extraction_regex")?,
            auto_extract: field(&schema, "auto_extract")?,
            modification_ms: field(&schema, "modification_ms")?,
            schema,
        })
    }
}

/// Build the tag/facet schema.
pub fn build_taxonomy_schema() -> SearchSchema {
    let mut schema_builder = Schema::builder();

    let collection = schema_builder.add_text_field("collection", STRING | STORED);
    // Not stored: rebuilt from collection + doc_id
    let doc_key = schema_builder.add_text_field("doc_key", STRING);
    let doc_id = schema_builder.add_text_field("doc_id", STRING | STORED);

    let label = schema_builder.add_text_field("label", TEXT | STORED);
    let friendly_name = schema_builder.add_text_field("friendly_name", TEXT | STORED);
    let description = schema_builder.add_text_field("description", TEXT | STORED);
    let keywords = schema_builder.add_text_field("keywords", TEXT | STORED);
    let extraction_keywords = schema_builder.add_text_field("extraction_keywords", STRING | STORED);
    let background_color = schema_builder.add_text_field("background_color", STRING | STORED);

    let facet_id = schema_builder.add_text_field("facet_id", STRING | STORED);
    let facet_title = schema_builder.add_text_field("facet_title", TEXT | STORED);
    let facet_prefix = schema_builder.add_text_field("facet_prefix", STRING | STORED);

    let mandatory = schema_builder.add_text_field("mandatory", STRING | STORED);
    let hidden = schema_builder.add_text_field("hidden", STRING | STORED);
    let extraction_regex = schema_builder.add_text_field("extraction_regex", STRING | STORED);
    let auto_extract = schema_builder.add_text_field("auto_extract", STRING | STORED);

    let modification_ms = schema_builder.add_text_field("modification_ms", STRING | STORED);

    let schema = schema_builder.build();

    SearchSchema {
        schema,
        collection,
        doc_key,
        doc_id,
        label,
        friendly_name,
        description,
        keywords,
        extraction_keywords,
        background_color,
        facet_id,
        facet_title,
        facet_prefix,
        mandatory,
        hidden,
        extraction_regex,
        auto_extract,
        modification_ms,
    }
}
