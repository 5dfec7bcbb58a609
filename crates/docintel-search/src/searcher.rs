//! Read side of the index: lookups by id, counts and BM25 keyword search
//! over tags.

use serde::Serialize;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{IndexReader, TantivyDocument, Term};
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{doc_to_facet, doc_to_tag, IndexedFacet, IndexedTag};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::{Collection, SearchSchema};

/// A tag search hit with relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct TagHit {
    pub tag: IndexedTag,
    /// BM25 relevance score
    pub score: f32,
}

/// Searcher over the tag and facet collections.
pub struct IndexSearcher {
    reader: IndexReader,
    schema: SearchSchema,
    query_parser: QueryParser,
}

impl IndexSearcher {
    /// Create a new searcher from a SearchIndex.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        let reader = index.reader()?;
        let schema = index.schema().clone();

        let query_parser = QueryParser::for_index(
            index.index(),
            vec![
                schema.label,
                schema.friendly_name,
                schema.keywords,
                schema.description,
            ],
        );

        Ok(Self {
            reader,
            schema,
            query_parser,
        })
    }

    /// Reload the reader to see recent commits.
    pub fn reload(&self) -> Result<(), SearchError> {
        self.reader.reload()?;
        debug!("Reloaded search reader");
        Ok(())
    }

    fn term_query(&self, field: tantivy::schema::Field, text: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(field, text),
            IndexRecordOption::Basic,
        ))
    }

    fn find_by_key(&self, collection: Collection, id: &Uuid) -> Result<Option<TantivyDocument>, SearchError> {
        let searcher = self.reader.searcher();
        let query = self.term_query(self.schema.doc_key, &collection.doc_key(id));
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top_docs.into_iter().next() {
            Some((_, address)) => Ok(Some(searcher.doc(address)?)),
            None => Ok(None),
        }
    }

    /// Fetch the indexed document of a tag.
    pub fn get_tag(&self, tag_id: &Uuid) -> Result<Option<IndexedTag>, SearchError> {
        match self.find_by_key(Collection::Tag, tag_id)? {
            Some(doc) => Ok(Some(doc_to_tag(&self.schema, &doc)?)),
            None => Ok(None),
        }
    }

    /// Fetch the indexed document of a facet.
    pub fn get_facet(&self, facet_id: &Uuid) -> Result<Option<IndexedFacet>, SearchError> {
        match self.find_by_key(Collection::Facet, facet_id)? {
            Some(doc) => Ok(Some(doc_to_facet(&self.schema, &doc)?)),
            None => Ok(None),
        }
    }

    /// Number of live documents in a collection.
    pub fn count(&self, collection: Collection) -> Result<usize, SearchError> {
        let searcher = self.reader.searcher();
        let query = self.term_query(self.schema.collection, collection.as_str());
        Ok(searcher.search(&query, &Count)?)
    }

    /// BM25 search over tag label, friendly name, keywords and description.
    pub fn search_tags(&self, query_str: &str, limit: usize) -> Result<Vec<TagHit>, SearchError> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let text_query = self.query_parser.parse_query(query_str)?;
        let query = BooleanQuery::new(vec![
            (Occur::Must, text_query),
            (
                Occur::Must,
                self.term_query(self.schema.collection, Collection::Tag.as_str()),
            ),
        ]);

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(TagHit {
                tag: doc_to_tag(&self.schema, &doc)?,
                score,
            });
        }

        info!(query = query_str, results = hits.len(), "Tag search complete");
        Ok(hits)
    }

    /// Total live documents across both collections.
    pub fn num_docs(&self) -> u64 {
        self.reader
            .searcher()
            .segment_readers()
            .iter()
            .map(|r| r.num_docs() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::SearchIndexer;

    fn tag(label: &str, prefix: &str, facet_id: Uuid, keywords: &[&str]) -> IndexedTag {
        IndexedTag {
            tag_id: Uuid::new_v4(),
            label: label.to_string(),
            friendly_name: format!("{}:{}", prefix, label),
            description: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            extraction_keywords: vec![],
            background_color: None,
            facet_id,
            facet_title: prefix.to_uppercase(),
            facet_prefix: Some(prefix.to_string()),
            modification_ms: 1_700_000_000_000,
        }
    }

    fn setup() -> (SearchIndex, SearchIndexer) {
        let index = SearchIndex::create_in_ram();
        let indexer = SearchIndexer::new(&index).unwrap();
        (index, indexer)
    }

    #[test]
    fn test_get_tag_roundtrip() {
        let (index, indexer) = setup();
        let emotet = tag("Emotet", "malware", Uuid::new_v4(), &["geodo"]);
        indexer.index_tag(&emotet).unwrap();
        indexer.commit().unwrap();

        let searcher = IndexSearcher::new(&index).unwrap();
        searcher.reload().unwrap();

        assert_eq!(searcher.get_tag(&emotet.tag_id).unwrap(), Some(emotet.clone()));
        assert!(searcher.get_facet(&emotet.tag_id).unwrap().is_none());
        assert!(searcher.get_tag(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_count_per_collection() {
        let (index, indexer) = setup();
        let malware = Uuid::new_v4();
        let actor = Uuid::new_v4();
        indexer.index_tag(&tag("Emotet", "malware", malware, &[])).unwrap();
        indexer.index_tag(&tag("TrickBot", "malware", malware, &[])).unwrap();
        indexer.index_tag(&tag("APT28", "actor", actor, &[])).unwrap();
        indexer.commit().unwrap();

        let searcher = IndexSearcher::new(&index).unwrap();
        searcher.reload().unwrap();

        assert_eq!(searcher.count(Collection::Tag).unwrap(), 3);
        assert_eq!(searcher.count(Collection::Facet).unwrap(), 0);
        assert_eq!(searcher.num_docs(), 3);
    }

    #[test]
    fn test_search_tags_by_keyword() {
        let (index, indexer) = setup();
        let facet = Uuid::new_v4();
        let emotet = tag("Emotet", "malware", facet, &["geodo", "heodo"]);
        indexer.index_tag(&emotet).unwrap();
        indexer.index_tag(&tag("Lazarus", "actor", facet, &["hidden cobra"])).unwrap();
        indexer.commit().unwrap();

        let searcher = IndexSearcher::new(&index).unwrap();
        searcher.reload().unwrap();

        let hits = searcher.search_tags("geodo", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tag.tag_id, emotet.tag_id);
        assert!(hits[0].score > 0.0);

        let by_prefix = searcher.search_tags("malware", 10).unwrap();
        assert_eq!(by_prefix.len(), 1);
    }

    #[test]
    fn test_empty_query() {
        let (index, _indexer) = setup();
        let searcher = IndexSearcher::new(&index).unwrap();
        assert!(searcher.search_tags("   ", 10).unwrap().is_empty());
        assert!(searcher.search_tags("emotet", 0).unwrap().is_empty());
    }
}
