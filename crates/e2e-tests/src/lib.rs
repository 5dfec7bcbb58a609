//! End-to-end test infrastructure for the DocIntel indexer.
//!
//! Provides a shared TestHarness (RocksDB in a temp dir, Tantivy in RAM)
//! and helpers for driving change events and sweeps through the real
//! consumer, sweeper and index utilities.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use docintel_indexing::{
    AutomationContextFactory, IndexingConsumer, IndexingError, ReconciliationSweeper,
    TagIndexingUtility, TantivyFacetIndexingUtility, TantivyTagIndexingUtility,
};
use docintel_search::{Collection, IndexSearcher, IndexedFacet, IndexedTag, SearchIndex, SearchIndexer};
use docintel_storage::Storage;
use docintel_types::{AutomationUser, Facet, ResolvedTag, StalenessPolicy, Tag};

/// Username of the service account the harness binds contexts to.
pub const AUTOMATION_USER: &str = "automation";

/// Deadline applied to every store and index call in tests.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub index: SearchIndex,
    pub factory: Arc<AutomationContextFactory>,
    pub tags: Arc<TantivyTagIndexingUtility>,
    pub facets: Arc<TantivyFacetIndexingUtility>,
}

impl TestHarness {
    /// Harness with a fully privileged automation account.
    pub fn new() -> Self {
        Self::with_user(Some(AutomationUser::new(AUTOMATION_USER)))
    }

    /// Harness with the given account stored, or none at all.
    pub fn with_user(user: Option<AutomationUser>) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage = Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));
        if let Some(user) = user {
            storage.put_user(&user).expect("Failed to store automation user");
        }

        let index = SearchIndex::create_in_ram();
        let indexer = Arc::new(SearchIndexer::new(&index).expect("Failed to open index writer"));

        Self {
            factory: Arc::new(AutomationContextFactory::new(
                storage.clone(),
                AUTOMATION_USER,
                OPERATION_TIMEOUT,
            )),
            tags: Arc::new(TantivyTagIndexingUtility::new(indexer.clone(), OPERATION_TIMEOUT)),
            facets: Arc::new(TantivyFacetIndexingUtility::new(indexer, OPERATION_TIMEOUT)),
            _temp_dir: temp_dir,
            storage,
            index,
        }
    }

    pub fn consumer(&self) -> IndexingConsumer {
        IndexingConsumer::new(self.factory.clone(), self.tags.clone(), self.facets.clone())
    }

    /// Consumer whose tag writes go through `tags` instead of the real utility.
    pub fn consumer_with_tags(&self, tags: Arc<dyn TagIndexingUtility>) -> IndexingConsumer {
        IndexingConsumer::new(self.factory.clone(), tags, self.facets.clone())
    }

    pub fn sweeper(&self, max_delay_minutes: u64) -> ReconciliationSweeper {
        ReconciliationSweeper::new(
            self.factory.clone(),
            self.tags.clone(),
            StalenessPolicy::from_minutes(max_delay_minutes),
            10,
        )
    }

    pub fn seed_facet(&self, title: &str, prefix: Option<&str>) -> Facet {
        let mut facet = Facet::new(Uuid::new_v4(), title);
        if let Some(prefix) = prefix {
            facet = facet.with_prefix(prefix);
        }
        self.storage.put_facet(&facet).expect("Failed to put facet");
        facet
    }

    pub fn seed_tag(&self, label: &str, facet_id: Uuid) -> Tag {
        let tag = Tag::new(Uuid::new_v4(), label, facet_id);
        self.storage.put_tag(&tag).expect("Failed to put tag");
        tag
    }

    /// Current stored record of a tag.
    pub fn stored_tag(&self, tag_id: Uuid) -> Option<Tag> {
        self.storage.get_tag(tag_id).expect("Failed to read tag")
    }

    fn searcher(&self) -> IndexSearcher {
        let searcher = IndexSearcher::new(&self.index).expect("Failed to open searcher");
        searcher.reload().expect("Failed to reload searcher");
        searcher
    }

    pub fn indexed_tag(&self, tag_id: Uuid) -> Option<IndexedTag> {
        self.searcher().get_tag(&tag_id).expect("Failed to read tag document")
    }

    pub fn indexed_facet(&self, facet_id: Uuid) -> Option<IndexedFacet> {
        self.searcher()
            .get_facet(&facet_id)
            .expect("Failed to read facet document")
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.searcher()
            .count(collection)
            .expect("Failed to count documents")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag utility that rejects writes for selected tags and delegates the rest.
pub struct RejectingTagUtility {
    inner: Arc<TantivyTagIndexingUtility>,
    rejected: Vec<Uuid>,
}

impl RejectingTagUtility {
    pub fn new(inner: Arc<TantivyTagIndexingUtility>, rejected: Vec<Uuid>) -> Self {
        Self { inner, rejected }
    }

    fn check(&self, tag_id: Uuid) -> Result<(), IndexingError> {
        if self.rejected.contains(&tag_id) {
            Err(IndexingError::IndexWrite(format!("document {} rejected", tag_id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TagIndexingUtility for RejectingTagUtility {
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
