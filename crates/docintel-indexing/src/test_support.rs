//! Shared fixtures for the unit tests of this crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use docintel_search::{Collection, IndexSearcher, IndexedFacet, IndexedTag, SearchIndex, SearchIndexer};
use docintel_storage::Storage;
use docintel_types::{AutomationUser, Facet, Permission, ResolvedTag, Tag};

use crate::consumer::IndexingConsumer;
use crate::context::AutomationContextFactory;
use crate::error::IndexingError;
use crate::tantivy_updater::{TantivyFacetIndexingUtility, TantivyTagIndexingUtility};
use crate::updater::TagIndexingUtility;

pub(crate) const AUTOMATION_USER: &str = "automation";

pub(crate) struct Fixture {
    pub storage: Arc<Storage>,
    pub index: SearchIndex,
    pub factory: Arc<AutomationContextFactory>,
    pub tags: Arc<TantivyTagIndexingUtility>,
    pub facets: Arc<TantivyFacetIndexingUtility>,
    _temp: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(Some(AutomationUser::new(AUTOMATION_USER)))
    }

    pub fn with_permissions(permissions: Vec<Permission>) -> Self {
        Self::build(Some(
            AutomationUser::new(AUTOMATION_USER).with_permissions(permissions),
        ))
    }

    pub fn without_user() -> Self {
        Self::build(None)
    }

    fn build(user: Option<AutomationUser>) -> Self {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        if let Some(user) = user {
            storage.put_user(&user).unwrap();
        }

        let timeout = Duration::from_secs(5);
        let index = SearchIndex::create_in_ram();
        let indexer = Arc::new(SearchIndexer::new(&index).unwrap());
        let factory = Arc::new(AutomationContextFactory::new(
            storage.clone(),
            AUTOMATION_USER,
            timeout,
        ));

        Self {
            storage,
            index,
            factory,
            tags: Arc::new(TantivyTagIndexingUtility::new(indexer.clone(), timeout)),
            facets: Arc::new(TantivyFacetIndexingUtility::new(indexer, timeout)),
            _temp: temp,
        }
    }

    pub fn consumer(&self) -> IndexingConsumer {
        IndexingConsumer::new(self.factory.clone(), self.tags.clone(), self.facets.clone())
    }

    pub fn facet(&self, title: &str, prefix: Option<&str>) -> Facet {
        let mut facet = Facet::new(Uuid::new_v4(), title);
        facet.prefix = prefix.map(str::to_string);
        self.storage.put_facet(&facet).unwrap();
        facet
    }

    pub fn tag(&self, label: &str, facet_id: Uuid) -> Tag {
        let tag = Tag::new(Uuid::new_v4(), label, facet_id);
        self.storage.put_tag(&tag).unwrap();
        tag
    }

    fn searcher(&self) -> IndexSearcher {
        let searcher = IndexSearcher::new(&self.index).unwrap();
        searcher.reload().unwrap();
        searcher
    }

    pub fn indexed_tag(&self, tag_id: Uuid) -> Option<IndexedTag> {
        self.searcher().get_tag(&tag_id).unwrap()
    }

    pub fn indexed_facet(&self, facet_id: Uuid) -> Option<IndexedFacet> {
        self.searcher().get_facet(&facet_id).unwrap()
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.searcher().count(collection).unwrap()
    }
}

/// Tag utility that rejects writes for selected tags and delegates the rest.
pub(crate) struct FailingTagUtility {
    inner: Arc<TantivyTagIndexingUtility>,
    failing: Vec<Uuid>,
}

impl FailingTagUtility {
    pub fn new(inner: Arc<TantivyTagIndexingUtility>, failing: Vec<Uuid>) -> Self {
        Self { inner, failing }
    }

    fn check(&self, tag_id: Uuid) -> Result<(), IndexingError> {
        if self.failing.contains(&tag_id) {
            Err(IndexingError::IndexWrite(format!("rejected document {}", tag_id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TagIndexingUtility for FailingTagUtility {
    async fn add(&self, tag: &ResolvedTag) -> Result<(), IndexingError> {
        self.check(tag.tag.tag_id)?;
        self.inner.add(tag).await
    }

    async fn update(&self, tag: &ResolvedTag) -> Result<(), IndexingError> {
        self.check(tag.tag.tag_id)?;
        self.inner.update(tag).await
    }

    async fn remove(&self, tag_id: Uuid) -> Result<(), IndexingError> {
        self.inner.remove(tag_id).await
    }

    async fn clear(&self) -> Result<(), IndexingError> {
        self.inner.clear().await
    }

    async fn commit(&self) -> Result<(), IndexingError> {
        self.inner.commit().await
    }
}

/// Tag utility that writes the document, then deletes the tag from the
/// store, as if a user removed it while the write was in flight.
pub(crate) struct VanishingTagUtility {
    inner: Arc<TantivyTagIndexingUtility>,
    storage: Arc<Storage>,
    vanishing: Vec<Uuid>,
}

impl VanishingTagUtility {
    pub fn new(inner: Arc<TantivyTagIndexingUtility>, storage: Arc<Storage>, vanishing: Vec<Uuid>) -> Self {
        Self {
            inner,
            storage,
            vanishing,
        }
    }

    fn vanish(&self, tag_id: Uuid) {
        if self.vanishing.contains(&tag_id) {
            assert!(self.storage.delete_tag(tag_id).unwrap());
        }
    }
}

#[async_trait]
impl TagIndexingUtility for VanishingTagUtility {
    async fn add(&self, tag: &ResolvedTag) -> Result<(), IndexingError> {
        self.inner.add(tag).await?;
        self.vanish(tag.tag.tag_id);
        Ok(())
    }

    async fn update(&self, tag: &ResolvedTag) -> Result<(), IndexingError> {
        self.inner.update(tag).await?;
        self.vanish(tag.tag.tag_id);
        Ok(())
    }

    async fn remove(&self, tag_id: Uuid) -> Result<(), IndexingError> {
        self.inner.remove(tag_id).await
    }

    async fn clear(&self) -> Result<(), IndexingError> {
        self.inner.clear().await
    }

    async fn commit(&self) -> Result<(), IndexingError> {
        self.inner.commit().await
    }
}
