//! Index update utilities backed by the Tantivy search index.
//!
//! Every call runs on the blocking pool and is bounded by the configured
//! operation timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use docintel_search::{Collection, IndexedFacet, IndexedTag, SearchIndexer};
use docintel_types::{Facet, ResolvedTag};

use crate::blocking::run_blocking;
use crate::error::IndexingError;
use crate::updater::{FacetIndexingUtility, TagIndexingUtility};

/// Tag utility writing through a shared `SearchIndexer`.
#[derive(Clone)]
pub struct TantivyTagIndexingUtility {
    indexer: Arc<SearchIndexer>,
    timeout: Duration,
}

impl TantivyTagIndexingUtility {
    pub fn new(indexer: Arc<SearchIndexer>, timeout: Duration) -> Self {
        Self { indexer, timeout }
    }

    async fn upsert(&self, tag: &ResolvedTag) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        let doc = IndexedTag::from_resolved(tag);
        run_blocking("tag index write", self.timeout, move || {
            Ok(indexer.index_tag(&doc)?)
        })
        .await
    }
}

#[async_trait]
impl TagIndexingUtility for TantivyTagIndexingUtility {
    async fn add(&self, tag: &ResolvedTag) -> Result<(), IndexingError> {
        self.upsert(tag).await
    }

    async fn update(&self, tag: &ResolvedTag) -> Result<(), IndexingError> {
        self.upsert(tag).await
    }

    async fn remove(&self, tag_id: Uuid) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        run_blocking("tag index remove", self.timeout, move || {
            Ok(indexer.delete(Collection::Tag, &tag_id)?)
        })
        .await
    }

    async fn clear(&self) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        run_blocking("tag index clear", self.timeout, move || {
            Ok(indexer.delete_collection(Collection::Tag)?)
        })
        .await
    }

    async fn commit(&self) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        let opstamp = run_blocking("index commit", self.timeout, move || Ok(indexer.commit()?)).await?;
        debug!(opstamp, "Committed tag index");
        Ok(())
    }
}

/// Facet utility writing through a shared `SearchIndexer`.
#[derive(Clone)]
pub struct TantivyFacetIndexingUtility {
    indexer: Arc<SearchIndexer>,
    timeout: Duration,
}

impl TantivyFacetIndexingUtility {
    pub fn new(indexer: Arc<SearchIndexer>, timeout: Duration) -> Self {
        Self { indexer, timeout }
    }

    async fn upsert(&self, facet: &Facet) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        let doc = IndexedFacet::from_facet(facet);
        run_blocking("facet index write", self.timeout, move || {
            Ok(indexer.index_facet(&doc)?)
        })
        .await
    }
}

#[async_trait]
impl FacetIndexingUtility for TantivyFacetIndexingUtility {
    async fn add(&self, facet: &Facet) -> Result<(), IndexingError> {
        self.upsert(facet).await
    }

    async fn update(&self, facet: &Facet) -> Result<(), IndexingError> {
        self.upsert(facet).await
    }

    async fn remove(&self, facet_id: Uuid) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        run_blocking("facet index remove", self.timeout, move || {
            Ok(indexer.delete(Collection::Facet, &facet_id)?)
        })
        .await
    }

    async fn clear(&self) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        run_blocking("facet index clear", self.timeout, move || {
            Ok(indexer.delete_collection(Collection::Facet)?)
        })
        .await
    }

    async fn commit(&self) -> Result<(), IndexingError> {
        let indexer = self.indexer.clone();
        let opstamp = run_blocking("index commit", self.timeout, move || Ok(indexer.commit()?)).await?;
        debug!(opstamp, "Committed facet index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docintel_search::{IndexSearcher, SearchIndex};
    use docintel_types::Tag;

    fn setup() -> (SearchIndex, TantivyTagIndexingUtility, TantivyFacetIndexingUtility) {
        let index = SearchIndex::create_in_ram();
        let indexer = Arc::new(SearchIndexer::new(&index).unwrap());
        let timeout = Duration::from_secs(5);
        (
            index,
            TantivyTagIndexingUtility::new(indexer.clone(), timeout),
            TantivyFacetIndexingUtility::new(indexer, timeout),
        )
    }

    fn resolved(label: &str) -> ResolvedTag {
        let facet = Facet::new(Uuid::new_v4(), "Malware").with_prefix("malware");
        let tag = Tag::new(Uuid::new_v4(), label, facet.facet_id);
        ResolvedTag { tag, facet }
    }

    #[tokio::test]
    async fn test_add_then_update_is_idempotent() {
        let (index, tags, _) = setup();
        let emotet = resolved("Emotet");

        tags.add(&emotet).await.unwrap();
        tags.commit().await.unwrap();
        let searcher = IndexSearcher::new(&index).unwrap();
        searcher.reload().unwrap();
        let first = searcher.get_tag(&emotet.tag.tag_id).unwrap().unwrap();

        tags.update(&emotet).await.unwrap();
        tags.commit().await.unwrap();
        searcher.reload().unwrap();
        let second = searcher.get_tag(&emotet.tag.tag_id).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(searcher.count(Collection::Tag).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_absent_is_ok() {
        let (_index, tags, facets) = setup();
        tags.remove(Uuid::new_v4()).await.unwrap();
        facets.remove(Uuid::new_v4()).await.unwrap();
        tags.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_facet_add_and_clear() {
        let (index, tags, facets) = setup();
        let emotet = resolved("Emotet");
        facets.add(&emotet.facet).await.unwrap();
        tags.add(&emotet).await.unwrap();
        facets.commit().await.unwrap();

        facets.clear().await.unwrap();
        facets.commit().await.unwrap();

        let searcher = IndexSearcher::new(&index).unwrap();
        searcher.reload().unwrap();
        assert_eq!(searcher.count(Collection::Facet).unwrap(), 0);
        assert_eq!(searcher.count(Collection::Tag).unwrap(), 1);
    }
}
