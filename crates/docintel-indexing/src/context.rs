//! Ambient context: a per-operation unit of work bound to the automation
//! identity.
//!
//! A context is created for every event and every sweep run and dropped
//! at the end of it. Reads and stamps go through its [`ScopedStore`],
//! which checks the identity's claims and bounds every call with the
//! operation timeout. Full-store scans get their own, longer deadline.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use docintel_storage::{Storage, StorageError};
use docintel_types::{Claims, Facet, Permission, ResolvedTag, StalenessPolicy, Tag};

use crate::blocking::run_blocking;
use crate::error::{EntityKind, IndexingError};

/// Produces fresh ambient contexts.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Open a new scope. Fails with `Configuration` when the automation
    /// identity cannot be resolved.
    async fn new_scope(&self) -> Result<AmbientContext, IndexingError>;
}

/// A per-operation bundle of store access and identity.
///
/// Dropping the context releases the scope exactly once.
pub struct AmbientContext {
    store: ScopedStore,
    claims: Claims,
    _release: ScopeRelease,
}

impl AmbientContext {
    pub fn store(&self) -> &ScopedStore {
        &self.store
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn scope_id(&self) -> u64 {
        self._release.scope_id
    }
}

struct ScopeRelease {
    scope_id: u64,
    open_scopes: Arc<AtomicUsize>,
}

impl Drop for ScopeRelease {
    fn drop(&mut self) {
        self.open_scopes.fetch_sub(1, Ordering::SeqCst);
        debug!(scope_id = self.scope_id, "Released ambient context");
    }
}

/// Context factory resolving the configured automation account from the
/// entity store on every scope.
pub struct AutomationContextFactory {
    storage: Arc<Storage>,
    username: String,
    timeout: Duration,
    scan_timeout: Duration,
    next_scope_id: AtomicU64,
    open_scopes: Arc<AtomicUsize>,
}

impl AutomationContextFactory {
    pub fn new(storage: Arc<Storage>, username: impl Into<String>, timeout: Duration) -> Self {
        Self {
            storage,
            username: username.into(),
            timeout,
            scan_timeout: timeout,
            next_scope_id: AtomicU64::new(1),
            open_scopes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Deadline for calls that walk every tag or facet. Defaults to the
    /// per-call timeout.
    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    /// Number of contexts created and not yet dropped.
    pub fn open_scopes(&self) -> usize {
        self.open_scopes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextFactory for AutomationContextFactory {
    async fn new_scope(&self) -> Result<AmbientContext, IndexingError> {
        let storage = self.storage.clone();
        let username = self.username.clone();
        let user = run_blocking("automation user lookup", self.timeout, move || {
            Ok(storage.get_user_by_username(&username)?)
        })
        .await?
        .ok_or_else(|| {
            IndexingError::Configuration(format!(
                "automation user '{}' does not exist",
                self.username
            ))
        })?;

        if !user.enabled {
            return Err(IndexingError::Configuration(format!(
                "automation user '{}' is disabled",
                self.username
            )));
        }

        let claims = Claims::for_user(&user);
        let scope_id = self.next_scope_id.fetch_add(1, Ordering::SeqCst);
        self.open_scopes.fetch_add(1, Ordering::SeqCst);
        debug!(scope_id, username = %user.username, "Opened ambient context");

        Ok(AmbientContext {
            store: ScopedStore {
                storage: self.storage.clone(),
                claims: claims.clone(),
                timeout: self.timeout,
                scan_timeout: self.scan_timeout,
            },
            claims,
            _release: ScopeRelease {
                scope_id,
                open_scopes: self.open_scopes.clone(),
            },
        })
    }
}

/// Entity store access on behalf of one context.
pub struct ScopedStore {
    storage: Arc<Storage>,
    claims: Claims,
    timeout: Duration,
    scan_timeout: Duration,
}

impl ScopedStore {
    /// Check a claim without touching the store.
    pub fn require(&self, permission: Permission, kind: EntityKind, id: Uuid) -> Result<(), IndexingError> {
        if self.claims.has(permission) {
            Ok(())
        } else {
            Err(IndexingError::Unauthorized {
                kind,
                id,
                permission,
            })
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    /// Fetch a tag with its facet.
    ///
    /// A tag whose facet has been deleted is reported as the facet missing.
    pub async fn get_tag_with_facet(&self, tag_id: Uuid) -> Result<ResolvedTag, IndexingError> {
        self.require(Permission::ViewTags, EntityKind::Tag, tag_id)?;
        self.require(Permission::ViewFacets, EntityKind::Tag, tag_id)?;

        let storage = self.storage.clone();
        let resolved = run_blocking("tag lookup", self.timeout, move || {
            match storage.get_tag_with_facet(tag_id) {
                Ok(resolved) => Ok(resolved),
                Err(StorageError::DanglingFacet { facet_id, .. }) => Err(IndexingError::NotFound {
                    kind: EntityKind::Facet,
                    id: facet_id,
                }),
                Err(e) => Err(e.into()),
            }
        })
        .await?;

        resolved.ok_or(IndexingError::NotFound {
            kind: EntityKind::Tag,
            id: tag_id,
        })
    }

    pub async fn get_facet(&self, facet_id: Uuid) -> Result<Facet, IndexingError> {
        self.require(Permission::ViewFacets, EntityKind::Facet, facet_id)?;

        let storage = self.storage.clone();
        run_blocking("facet lookup", self.timeout, move || Ok(storage.get_facet(facet_id)?))
            .await?
            .ok_or(IndexingError::NotFound {
                kind: EntityKind::Facet,
                id: facet_id,
            })
    }

    /// Tags currently owned by a facet.
    pub async fn tags_for_facet(&self, facet_id: Uuid) -> Result<Vec<Tag>, IndexingError> {
        self.require(Permission::ViewTags, EntityKind::Facet, facet_id)?;

        let storage = self.storage.clone();
        run_blocking("facet tags lookup", self.timeout, move || {
            Ok(storage.get_tags_for_facet(facet_id)?)
        })
        .await
    }

    pub async fn find_stale_tags(&self, policy: StalenessPolicy) -> Result<Vec<Tag>, IndexingError> {
        self.require(Permission::ViewTags, EntityKind::Tag, Uuid::nil())?;

        let storage = self.storage.clone();
        run_blocking("stale tag scan", self.scan_timeout, move || {
            Ok(storage.find_stale_tags(&policy)?)
        })
        .await
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>, IndexingError> {
        self.require(Permission::ViewTags, EntityKind::Tag, Uuid::nil())?;

        let storage = self.storage.clone();
        run_blocking("tag listing", self.scan_timeout, move || Ok(storage.list_tags()?)).await
    }

    pub async fn list_facets(&self) -> Result<Vec<Facet>, IndexingError> {
        self.require(Permission::ViewFacets, EntityKind::Facet, Uuid::nil())?;

        let storage = self.storage.clone();
        run_blocking("facet listing", self.scan_timeout, move || Ok(storage.list_facets()?)).await
    }

    /// Persist the last-index date of a tag. `NotFound` when the tag was
    /// deleted in the meantime.
    pub async fn stamp_tag(&self, tag_id: Uuid, when: DateTime<Utc>) -> Result<(), IndexingError> {
        self.require(Permission::IndexTags, EntityKind::Tag, tag_id)?;

        let storage = self.storage.clone();
        run_blocking("tag stamp", self.timeout, move || {
            match storage.stamp_tag_indexed(tag_id, when) {
                Ok(_) => Ok(()),
                Err(StorageError::NotFound(_)) => Err(IndexingError::NotFound {
                    kind: EntityKind::Tag,
                    id: tag_id,
                }),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Stamp several tags at once. Returns the ids that no longer exist.
    pub async fn stamp_tags(&self, tag_ids: Vec<Uuid>, when: DateTime<Utc>) -> Result<Vec<Uuid>, IndexingError> {
        self.require(Permission::IndexTags, EntityKind::Tag, Uuid::nil())?;

        let storage = self.storage.clone();
        run_blocking("tag stamp batch", self.timeout, move || {
            Ok(storage.stamp_tags_indexed(&tag_ids, when)?)
        })
        .await
    }

    pub async fn stamp_facet(&self, facet_id: Uuid, when: DateTime<Utc>) -> Result<(), IndexingError> {
        self.require(Permission::IndexFacets, EntityKind::Facet, facet_id)?;

        let storage = self.storage.clone();
        run_blocking("facet stamp", self.timeout, move || {
            match storage.stamp_facet_indexed(facet_id, when) {
                Ok(_) => Ok(()),
                Err(StorageError::NotFound(_)) => Err(IndexingError::NotFound {
                    kind: EntityKind::Facet,
                    id: facet_id,
                }),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docintel_types::AutomationUser;
    use tempfile::TempDir;

    fn setup(user: Option<AutomationUser>) -> (AutomationContextFactory, Arc<Storage>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        if let Some(user) = user {
            storage.put_user(&user).unwrap();
        }
        let factory =
            AutomationContextFactory::new(storage.clone(), "automation", Duration::from_secs(5));
        (factory, storage, temp)
    }

    #[tokio::test]
    async fn test_missing_user_is_configuration_error() {
        let (factory, _storage, _temp) = setup(None);
        let err = factory.new_scope().await.err().unwrap();
        assert!(matches!(err, IndexingError::Configuration(_)));
        assert_eq!(factory.open_scopes(), 0);
    }

    #[tokio::test]
    async fn test_disabled_user_is_configuration_error() {
        let mut user = AutomationUser::new("automation");
        user.enabled = false;
        let (factory, _storage, _temp) = setup(Some(user));
        assert!(matches!(
            factory.new_scope().await,
            Err(IndexingError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_scans_use_their_own_deadline() {
        let (factory, _storage, _temp) = setup(Some(AutomationUser::new("automation")));
        let ctx = factory.new_scope().await.unwrap();
        assert_eq!(ctx.store().scan_timeout(), Duration::from_secs(5));
        drop(ctx);

        let factory = factory.with_scan_timeout(Duration::from_secs(600));
        let ctx = factory.new_scope().await.unwrap();
        assert_eq!(ctx.store().scan_timeout(), Duration::from_secs(600));
        assert!(ctx.store().find_stale_tags(StalenessPolicy::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scopes_are_fresh_and_released() {
        let (factory, _storage, _temp) = setup(Some(AutomationUser::new("Automation")));

        let first = factory.new_scope().await.unwrap();
        let second = factory.new_scope().await.unwrap();
        assert_ne!(first.scope_id(), second.scope_id());
        assert_eq!(first.claims().username, "Automation");
        assert_eq!(factory.open_scopes(), 2);

        drop(first);
        assert_eq!(factory.open_scopes(), 1);
        drop(second);
        assert_eq!(factory.open_scopes(), 0);
    }

    #[tokio::test]
    async fn test_scope_released_on_early_return() {
        let (factory, _storage, _temp) = setup(Some(AutomationUser::new("automation")));

        async fn failing(factory: &AutomationContextFactory) -> Result<(), IndexingError> {
            let ctx = factory.new_scope().await?;
            ctx.store().get_facet(Uuid::new_v4()).await?;
            Ok(())
        }

        assert!(failing(&factory).await.unwrap_err().is_not_found());
        assert_eq!(factory.open_scopes(), 0);
    }

    #[tokio::test]
    async fn test_missing_permission_is_unauthorized() {
        let user = AutomationUser::new("automation").with_permissions(vec![Permission::ViewTags]);
        let (factory, storage, _temp) = setup(Some(user));
        let facet = Facet::new(Uuid::new_v4(), "Malware");
        storage.put_facet(&facet).unwrap();

        let ctx = factory.new_scope().await.unwrap();
        let err = ctx.store().get_facet(facet.facet_id).await.unwrap_err();
        assert!(matches!(
            err,
            IndexingError::Unauthorized {
                permission: Permission::ViewFacets,
                ..
            }
        ));
        assert!(ctx
            .store()
            .stamp_tag(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err()
            .is_expected());
    }

    #[tokio::test]
    async fn test_dangling_facet_reads_as_missing_facet() {
        let (factory, storage, _temp) = setup(Some(AutomationUser::new("automation")));
        let facet_id = Uuid::new_v4();
        let tag = Tag::new(Uuid::new_v4(), "Orphan", facet_id);
        storage.put_tag(&tag).unwrap();

        let ctx = factory.new_scope().await.unwrap();
        match ctx.store().get_tag_with_facet(tag.tag_id).await {
            Err(IndexingError::NotFound { kind, id }) => {
                assert_eq!(kind, EntityKind::Facet);
                assert_eq!(id, facet_id);
            }
            other => panic!("unexpected result {:?}", other.map(|r| r.tag.tag_id)),
        }
    }

    #[tokio::test]
    async fn test_stamp_of_deleted_tag_is_not_found() {
        let (factory, storage, _temp) = setup(Some(AutomationUser::new("automation")));
        let facet = Facet::new(Uuid::new_v4(), "Malware");
        storage.put_facet(&facet).unwrap();
        let tag = Tag::new(Uuid::new_v4(), "Emotet", facet.facet_id);
        storage.put_tag(&tag).unwrap();

        let ctx = factory.new_scope().await.unwrap();
        ctx.store().stamp_tag(tag.tag_id, Utc::now()).await.unwrap();
        storage.delete_tag(tag.tag_id).unwrap();

        assert!(ctx
            .store()
            .stamp_tag(tag.tag_id, Utc::now())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(storage.get_tag(tag.tag_id).unwrap().is_none());
    }
}
