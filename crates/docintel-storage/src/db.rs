//! RocksDB wrapper for the DocIntel entity store.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Tag and facet records with a facet membership index
//! - Reads by id with facet expansion, and query by facet
//! - Tag -> document associations used by the staleness scan
//! - Targeted last-index stamps that never resurrect deleted records

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};
use uuid::Uuid;

use docintel_types::{AutomationUser, DocumentRef, Facet, ResolvedTag, StalenessPolicy, Tag};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_FACETS, CF_FACET_TAGS, CF_TAGS, CF_TAG_DOCUMENTS,
    CF_USERS,
};
use crate::error::StorageError;
use crate::keys::{FacetKey, FacetTagKey, TagDocumentKey, TagKey, UserKey};

/// Main storage interface for the entity store
pub struct Storage {
    db: DB,
    /// Serializes every read-modify-write so stamps cannot lose updates
    /// against concurrent record writes.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        self.write_lock
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Collect the keys of a column family starting with `prefix`.
    fn keys_with_prefix(&self, cf: &ColumnFamily, prefix: &[u8]) -> Result<Vec<Box<[u8]>>, StorageError> {
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    // ==================== Facet Methods ====================

    /// Insert or replace a facet record.
    pub fn put_facet(&self, facet: &Facet) -> Result<(), StorageError> {
        let cf = self.cf(CF_FACETS)?;
        let _guard = self.lock()?;
        self.db
            .put_cf(cf, FacetKey(facet.facet_id).to_bytes(), facet.to_bytes()?)?;
        debug!(facet_id = %facet.facet_id, "Stored facet");
        Ok(())
    }

    pub fn get_facet(&self, facet_id: Uuid) -> Result<Option<Facet>, StorageError> {
        let cf = self.cf(CF_FACETS)?;
        match self.db.get_cf(cf, FacetKey(facet_id).to_bytes())? {
            Some(bytes) => Ok(Some(Facet::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_facets(&self) -> Result<Vec<Facet>, StorageError> {
        let cf = self.cf(CF_FACETS)?;
        let mut facets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            facets.push(Facet::from_bytes(&value)?);
        }
        Ok(facets)
    }

    /// Delete a facet together with every tag it owns.
    ///
    /// Returns the ids of the removed tags. Deleting an absent facet is a
    /// no-op returning an empty list.
    pub fn delete_facet(&self, facet_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let facets_cf = self.cf(CF_FACETS)?;
        let tags_cf = self.cf(CF_TAGS)?;
        let members_cf = self.cf(CF_FACET_TAGS)?;
        let docs_cf = self.cf(CF_TAG_DOCUMENTS)?;
        let _guard = self.lock()?;

        let mut batch = WriteBatch::default();
        let mut removed = Vec::new();

        for key in self.keys_with_prefix(members_cf, &FacetTagKey::prefix(facet_id))? {
            let member = FacetTagKey::from_bytes(&key)?;
            batch.delete_cf(members_cf, &key);
            batch.delete_cf(tags_cf, TagKey(member.tag_id).to_bytes());
            for doc_key in self.keys_with_prefix(docs_cf, &TagDocumentKey::prefix(member.tag_id))? {
                batch.delete_cf(docs_cf, &doc_key);
            }
            removed.push(member.tag_id);
        }
        batch.delete_cf(facets_cf, FacetKey(facet_id).to_bytes());

        self.db.write(batch)?;
        debug!(facet_id = %facet_id, tags = removed.len(), "Deleted facet");
        Ok(removed)
    }

    /// Move every tag of `removed_id` to `retained_id` and delete the
    /// removed facet. Returns the ids of the moved tags.
    pub fn merge_facets(&self, retained_id: Uuid, removed_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        if retained_id == removed_id {
            return Err(StorageError::SelfMerge(format!("facet {}", retained_id)));
        }
        let facets_cf = self.cf(CF_FACETS)?;
        let tags_cf = self.cf(CF_TAGS)?;
        let members_cf = self.cf(CF_FACET_TAGS)?;
        let _guard = self.lock()?;

        let retained_bytes = self
            .db
            .get_cf(facets_cf, FacetKey(retained_id).to_bytes())?
            .ok_or_else(|| StorageError::NotFound(format!("facet {}", retained_id)))?;
        let mut retained = Facet::from_bytes(&retained_bytes)?;
        let now = Utc::now();

        let mut batch = WriteBatch::default();
        let mut moved = Vec::new();

        for key in self.keys_with_prefix(members_cf, &FacetTagKey::prefix(removed_id))? {
            let member = FacetTagKey::from_bytes(&key)?;
            batch.delete_cf(members_cf, &key);
            if let Some(bytes) = self.db.get_cf(tags_cf, TagKey(member.tag_id).to_bytes())? {
                let mut tag = Tag::from_bytes(&bytes)?;
                tag.facet_id = retained_id;
                tag.modification_date = now;
                batch.put_cf(tags_cf, TagKey(tag.tag_id).to_bytes(), tag.to_bytes()?);
                batch.put_cf(
                    members_cf,
                    FacetTagKey::new(retained_id, tag.tag_id).to_bytes(),
                    b"",
                );
                moved.push(tag.tag_id);
            }
        }

        retained.modification_date = now;
        batch.put_cf(facets_cf, FacetKey(retained_id).to_bytes(), retained.to_bytes()?);
        batch.delete_cf(facets_cf, FacetKey(removed_id).to_bytes());

        self.db.write(batch)?;
        debug!(
            retained = %retained_id,
            removed = %removed_id,
            moved = moved.len(),
            "Merged facets"
        );
        Ok(moved)
    }

    // ==================== Tag Methods ====================

    /// Insert or replace a tag record, keeping the facet membership index
    /// in step when the tag changes facet.
    pub fn put_tag(&self, tag: &Tag) -> Result<(), StorageError> {
        let tags_cf = self.cf(CF_TAGS)?;
        let members_cf = self.cf(CF_FACET_TAGS)?;
        let _guard = self.lock()?;

        let key = TagKey(tag.tag_id).to_bytes();
        let mut batch = WriteBatch::default();

        if let Some(bytes) = self.db.get_cf(tags_cf, &key)? {
            let previous = Tag::from_bytes(&bytes)?;
            if previous.facet_id != tag.facet_id {
                batch.delete_cf(
                    members_cf,
                    FacetTagKey::new(previous.facet_id, tag.tag_id).to_bytes(),
                );
            }
        }

        batch.put_cf(tags_cf, &key, tag.to_bytes()?);
        batch.put_cf(
            members_cf,
            FacetTagKey::new(tag.facet_id, tag.tag_id).to_bytes(),
            b"",
        );
        self.db.write(batch)?;

        debug!(tag_id = %tag.tag_id, facet_id = %tag.facet_id, "Stored tag");
        Ok(())
    }

    pub fn get_tag(&self, tag_id: Uuid) -> Result<Option<Tag>, StorageError> {
        let cf = self.cf(CF_TAGS)?;
        match self.db.get_cf(cf, TagKey(tag_id).to_bytes())? {
            Some(bytes) => Ok(Some(Tag::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch a tag together with its owning facet.
    ///
    /// A tag whose facet is missing is reported as `DanglingFacet` rather
    /// than silently projected without a prefix.
    pub fn get_tag_with_facet(&self, tag_id: Uuid) -> Result<Option<ResolvedTag>, StorageError> {
        let Some(tag) = self.get_tag(tag_id)? else {
            return Ok(None);
        };
        let facet = self
            .get_facet(tag.facet_id)?
            .ok_or(StorageError::DanglingFacet {
                tag_id,
                facet_id: tag.facet_id,
            })?;
        Ok(Some(ResolvedTag { tag, facet }))
    }

    /// Delete a tag, its membership entry and its document associations.
    ///
    /// Returns false when the tag did not exist.
    pub fn delete_tag(&self, tag_id: Uuid) -> Result<bool, StorageError> {
        let tags_cf = self.cf(CF_TAGS)?;
        let members_cf = self.cf(CF_FACET_TAGS)?;
        let docs_cf = self.cf(CF_TAG_DOCUMENTS)?;
        let _guard = self.lock()?;

        let key = TagKey(tag_id).to_bytes();
        let Some(bytes) = self.db.get_cf(tags_cf, &key)? else {
            return Ok(false);
        };
        let tag = Tag::from_bytes(&bytes)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(tags_cf, &key);
        batch.delete_cf(members_cf, FacetTagKey::new(tag.facet_id, tag_id).to_bytes());
        for doc_key in self.keys_with_prefix(docs_cf, &TagDocumentKey::prefix(tag_id))? {
            batch.delete_cf(docs_cf, &doc_key);
        }
        self.db.write(batch)?;

        debug!(tag_id = %tag_id, "Deleted tag");
        Ok(true)
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>, StorageError> {
        let cf = self.cf(CF_TAGS)?;
        let mut tags = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            tags.push(Tag::from_bytes(&value)?);
        }
        Ok(tags)
    }

    /// All tags currently owned by a facet.
    pub fn get_tags_for_facet(&self, facet_id: Uuid) -> Result<Vec<Tag>, StorageError> {
        let members_cf = self.cf(CF_FACET_TAGS)?;
        let mut tags = Vec::new();
        for key in self.keys_with_prefix(members_cf, &FacetTagKey::prefix(facet_id))? {
            let member = FacetTagKey::from_bytes(&key)?;
            // Membership entries are written with the tag; a miss means a
            // concurrent delete, not corruption.
            if let Some(tag) = self.get_tag(member.tag_id)? {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    /// Merge `removed_id` into `retained_id`: document associations move to
    /// the retained tag and the removed tag is deleted.
    pub fn merge_tags(&self, retained_id: Uuid, removed_id: Uuid) -> Result<(), StorageError> {
        if retained_id == removed_id {
            return Err(StorageError::SelfMerge(format!("tag {}", retained_id)));
        }
        let tags_cf = self.cf(CF_TAGS)?;
        let members_cf = self.cf(CF_FACET_TAGS)?;
        let docs_cf = self.cf(CF_TAG_DOCUMENTS)?;
        let _guard = self.lock()?;

        let retained_bytes = self
            .db
            .get_cf(tags_cf, TagKey(retained_id).to_bytes())?
            .ok_or_else(|| StorageError::NotFound(format!("tag {}", retained_id)))?;
        let mut retained = Tag::from_bytes(&retained_bytes)?;

        let mut batch = WriteBatch::default();
        for doc_key in self.keys_with_prefix(docs_cf, &TagDocumentKey::prefix(removed_id))? {
            let association = TagDocumentKey::from_bytes(&doc_key)?;
            if let Some(value) = self.db.get_cf(docs_cf, &doc_key)? {
                batch.put_cf(
                    docs_cf,
                    TagDocumentKey::new(retained_id, association.document_id).to_bytes(),
                    value,
                );
            }
            batch.delete_cf(docs_cf, &doc_key);
        }

        if let Some(bytes) = self.db.get_cf(tags_cf, TagKey(removed_id).to_bytes())? {
            let removed = Tag::from_bytes(&bytes)?;
            batch.delete_cf(
                members_cf,
                FacetTagKey::new(removed.facet_id, removed_id).to_bytes(),
            );
            batch.delete_cf(tags_cf, TagKey(removed_id).to_bytes());
        }

        retained.modification_date = Utc::now();
        batch.put_cf(tags_cf, TagKey(retained_id).to_bytes(), retained.to_bytes()?);

        self.db.write(batch)?;
        debug!(retained = %retained_id, removed = %removed_id, "Merged tags");
        Ok(())
    }

    // ==================== Document Association Methods ====================

    /// Record that a document carries a tag.
    pub fn link_document(&self, tag_id: Uuid, document: &DocumentRef) -> Result<(), StorageError> {
        let tags_cf = self.cf(CF_TAGS)?;
        let docs_cf = self.cf(CF_TAG_DOCUMENTS)?;
        let _guard = self.lock()?;

        if self.db.get_cf(tags_cf, TagKey(tag_id).to_bytes())?.is_none() {
            return Err(StorageError::NotFound(format!("tag {}", tag_id)));
        }

        self.db.put_cf(
            docs_cf,
            TagDocumentKey::new(tag_id, document.document_id).to_bytes(),
            document.to_bytes()?,
        )?;
        Ok(())
    }

    /// Newest document date among the tag's associations.
    pub fn latest_document_date(&self, tag_id: Uuid) -> Result<Option<DateTime<Utc>>, StorageError> {
        let docs_cf = self.cf(CF_TAG_DOCUMENTS)?;
        let prefix = TagDocumentKey::prefix(tag_id);

        let mut latest: Option<DateTime<Utc>> = None;
        let iter = self
            .db
            .iterator_cf(docs_cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let document = DocumentRef::from_bytes(&value)?;
            latest = Some(latest.map_or(document.document_date, |l| l.max(document.document_date)));
        }
        Ok(latest)
    }

    pub fn document_count(&self, tag_id: Uuid) -> Result<usize, StorageError> {
        let docs_cf = self.cf(CF_TAG_DOCUMENTS)?;
        Ok(self
            .keys_with_prefix(docs_cf, &TagDocumentKey::prefix(tag_id))?
            .len())
    }

    /// Tags whose index lags behind their changes by more than the policy allows.
    pub fn find_stale_tags(&self, policy: &StalenessPolicy) -> Result<Vec<Tag>, StorageError> {
        let mut stale = Vec::new();
        for tag in self.list_tags()? {
            let latest = self.latest_document_date(tag.tag_id)?;
            if policy.is_stale(&tag, latest) {
                stale.push(tag);
            }
        }
        Ok(stale)
    }

    // ==================== Last-Index Stamps ====================

    /// Persist the last-index date of a tag.
    ///
    /// Only `last_index_date` is written, it never moves backwards, and an
    /// absent tag yields `NotFound` instead of being recreated.
    pub fn stamp_tag_indexed(&self, tag_id: Uuid, when: DateTime<Utc>) -> Result<Tag, StorageError> {
        let cf = self.cf(CF_TAGS)?;
        let _guard = self.lock()?;
        let tag = self.stamp_tag_locked(cf, tag_id, when)?;
        tag.ok_or_else(|| StorageError::NotFound(format!("tag {}", tag_id)))
    }

    /// Stamp several tags in one write. Returns the ids that no longer exist.
    pub fn stamp_tags_indexed(
        &self,
        tag_ids: &[Uuid],
        when: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StorageError> {
        let cf = self.cf(CF_TAGS)?;
        let _guard = self.lock()?;

        let mut batch = WriteBatch::default();
        let mut missing = Vec::new();
        for &tag_id in tag_ids {
            match self.db.get_cf(cf, TagKey(tag_id).to_bytes())? {
                Some(bytes) => {
                    let mut tag = Tag::from_bytes(&bytes)?;
                    tag.last_index_date = Some(tag.last_index_date.map_or(when, |d| d.max(when)));
                    batch.put_cf(cf, TagKey(tag_id).to_bytes(), tag.to_bytes()?);
                }
                None => missing.push(tag_id),
            }
        }
        self.db.write(batch)?;
        Ok(missing)
    }

    fn stamp_tag_locked(
        &self,
        cf: &ColumnFamily,
        tag_id: Uuid,
        when: DateTime<Utc>,
    ) -> Result<Option<Tag>, StorageError> {
        let key = TagKey(tag_id).to_bytes();
        let Some(bytes) = self.db.get_cf(cf, &key)? else {
            return Ok(None);
        };
        let mut tag = Tag::from_bytes(&bytes)?;
        tag.last_index_date = Some(tag.last_index_date.map_or(when, |d| d.max(when)));
        self.db.put_cf(cf, &key, tag.to_bytes()?)?;
        Ok(Some(tag))
    }

    /// Persist the last-index date of a facet, with the same rules as tags.
    pub fn stamp_facet_indexed(&self, facet_id: Uuid, when: DateTime<Utc>) -> Result<Facet, StorageError> {
        let cf = self.cf(CF_FACETS)?;
        let _guard = self.lock()?;

        let key = FacetKey(facet_id).to_bytes();
        let bytes = self
            .db
            .get_cf(cf, &key)?
            .ok_or_else(|| StorageError::NotFound(format!("facet {}", facet_id)))?;
        let mut facet = Facet::from_bytes(&bytes)?;
        facet.last_index_date = Some(facet.last_index_date.map_or(when, |d| d.max(when)));
        self.db.put_cf(cf, &key, facet.to_bytes()?)?;
        Ok(facet)
    }

    // ==================== User Methods ====================

    pub fn put_user(&self, user: &AutomationUser) -> Result<(), StorageError> {
        let cf = self.cf(CF_USERS)?;
        self.db
            .put_cf(cf, UserKey::new(&user.username).to_bytes(), user.to_bytes()?)?;
        debug!(username = %user.username, "Stored automation user");
        Ok(())
    }

    /// Look up an account by username, ignoring case.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<AutomationUser>, StorageError> {
        let cf = self.cf(CF_USERS)?;
        match self.db.get_cf(cf, UserKey::new(username).to_bytes())? {
            Some(bytes) => Ok(Some(AutomationUser::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    // ==================== Maintenance ====================

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();

        if let Some(cf) = self.db.cf_handle(CF_TAGS) {
            stats.tag_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_FACETS) {
            stats.facet_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_TAG_DOCUMENTS) {
            stats.association_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_USERS) {
            stats.user_count = self.count_cf_entries(cf)?;
        }

        stats.disk_usage_bytes = self.get_disk_usage()?;

        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> Result<u64, StorageError> {
        let path = self.db.path();
        let mut total_size = 0u64;

        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }

        Ok(total_size)
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of tags
    pub tag_count: u64,
    /// Number of facets
    pub facet_count: u64,
    /// Number of tag/document associations
    pub association_count: u64,
    /// Number of automation accounts
    pub user_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
