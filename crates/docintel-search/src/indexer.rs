//! Search indexer for writing tag and facet documents.
//!
//! The indexer wraps IndexWriter with shared access via Arc<Mutex>.
//! Documents are not visible until commit() is called.

use std::sync::{Arc, Mutex};

use tantivy::{IndexWriter, Term};
use tracing::debug;
use uuid::Uuid;

use crate::document::{facet_to_doc, tag_to_doc, IndexedFacet, IndexedTag};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::{Collection, SearchSchema};

/// Manages document indexing operations.
///
/// Writes are upserts keyed by `collection:id`; deletes of absent keys
/// are no-ops.
pub struct SearchIndexer {
    writer: Arc<Mutex<IndexWriter>>,
    schema: SearchSchema,
}

impl SearchIndexer {
    /// Create a new indexer from a SearchIndex.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        let writer = index.writer()?;
        let schema = index.schema().clone();

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            schema,
        })
    }

    fn key_term(&self, collection: Collection, id: &Uuid) -> Term {
        Term::from_field_text(self.schema.doc_key, &collection.doc_key(id))
    }

    /// Index a tag, replacing any document with the same id.
    pub fn index_tag(&self, tag: &IndexedTag) -> Result<(), SearchError> {
        let doc = tag_to_doc(&self.schema, tag);

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_term(self.key_term(Collection::Tag, &tag.tag_id));
        writer.add_document(doc)?;

        debug!(tag_id = %tag.tag_id, friendly_name = %tag.friendly_name, "Indexed tag");
        Ok(())
    }

    /// Index a facet, replacing any document with the same id.
    pub fn index_facet(&self, facet: &IndexedFacet) -> Result<(), SearchError> {
        let doc = facet_to_doc(&self.schema, facet);

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_term(self.key_term(Collection::Facet, &facet.facet_id));
        writer.add_document(doc)?;

        debug!(facet_id = %facet.facet_id, title = %facet.title, "Indexed facet");
        Ok(())
    }

    /// Delete a document by collection and id.
    pub fn delete(&self, collection: Collection, id: &Uuid) -> Result<(), SearchError> {
        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_term(self.key_term(collection, id));

        debug!(collection = %collection, id = %id, "Deleted document");
        Ok(())
    }

    /// Delete every document of a collection.
    pub fn delete_collection(&self, collection: Collection) -> Result<(), SearchError> {
        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_term(Term::from_field_text(
            self.schema.collection,
            collection.as_str(),
        ));

        debug!(collection = %collection, "Cleared collection");
        Ok(())
    }

    /// Commit pending changes to make them searchable.
    pub fn commit(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.commit()?;
        debug!(opstamp, "Committed index changes");
        Ok(opstamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchIndexConfig;
    use tempfile::TempDir;

    fn sample_tag(label: &str, facet_id: Uuid) -> IndexedTag {
        IndexedTag {
            tag_id: Uuid::new_v4(),
            label: label.to_string(),
            friendly_name: format!("malware:{}", label),
            description: None,
            keywords: vec![],
            extraction_keywords: vec![],
            background_color: None,
            facet_id,
            facet_title: "Malware".to_string(),
            facet_prefix: Some("malware".to_string()),
            modification_ms: 0,
        }
    }

    fn sample_facet(id: Uuid) -> IndexedFacet {
        IndexedFacet {
            facet_id: id,
            title: "Malware".to_string(),
            prefix: Some("malware".to_string()),
            description: None,
            mandatory: false,
            hidden: false,
            extraction_regex: None,
            auto_extract: false,
            modification_ms: 0,
        }
    }

    fn num_docs(index: &SearchIndex) -> u64 {
        let reader = index.reader().unwrap();
        reader.reload().unwrap();
        reader
            .searcher()
            .segment_readers()
            .iter()
            .map(|r| r.num_docs() as u64)
            .sum()
    }

    #[test]
    fn test_index_tag_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path())).unwrap();
        let indexer = SearchIndexer::new(&index).unwrap();

        indexer.index_tag(&sample_tag("Emotet", Uuid::new_v4())).unwrap();
        indexer.commit().unwrap();

        assert_eq!(num_docs(&index), 1);
    }

    #[test]
    fn test_update_existing_tag() {
        let index = SearchIndex::create_in_ram();
        let indexer = SearchIndexer::new(&index).unwrap();

        let mut tag = sample_tag("Emotet", Uuid::new_v4());
        indexer.index_tag(&tag).unwrap();
        indexer.commit().unwrap();

        tag.label = "Emotet v2".to_string();
        indexer.index_tag(&tag).unwrap();
        indexer.commit().unwrap();

        assert_eq!(num_docs(&index), 1);
    }

    #[test]
    fn test_same_id_in_both_collections() {
        let index = SearchIndex::create_in_ram();
        let indexer = SearchIndexer::new(&index).unwrap();
        let id = Uuid::new_v4();

        let mut tag = sample_tag("Emotet", id);
        tag.tag_id = id;
        indexer.index_tag(&tag).unwrap();
        indexer.index_facet(&sample_facet(id)).unwrap();
        indexer.commit().unwrap();
        assert_eq!(num_docs(&index), 2);

        indexer.delete(Collection::Tag, &id).unwrap();
        indexer.commit().unwrap();
        assert_eq!(num_docs(&index), 1);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let index = SearchIndex::create_in_ram();
        let indexer = SearchIndexer::new(&index).unwrap();

        indexer.delete(Collection::Tag, &Uuid::new_v4()).unwrap();
        indexer.delete(Collection::Tag, &Uuid::new_v4()).unwrap();
        indexer.commit().unwrap();
        assert_eq!(num_docs(&index), 0);
    }

    #[test]
    fn test_delete_collection_keeps_other_collection() {
        let index = SearchIndex::create_in_ram();
        let indexer = SearchIndexer::new(&index).unwrap();
        let facet_id = Uuid::new_v4();

        for label in ["Emotet", "TrickBot", "Qakbot"] {
            indexer.index_tag(&sample_tag(label, facet_id)).unwrap();
        }
        indexer.index_facet(&sample_facet(facet_id)).unwrap();
        indexer.commit().unwrap();
        assert_eq!(num_docs(&index), 4);

        indexer.delete_collection(Collection::Tag).unwrap();
        indexer.commit().unwrap();
        assert_eq!(num_docs(&index), 1);
    }
}
