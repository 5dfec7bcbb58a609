//! Indexing message consumer.
//!
//! Translates one change event into index mutations. Every entity touched
//! by an event is handled and recorded on its own: a failure for one tag
//! never prevents the others of the same event from being indexed, and
//! nothing escapes `handle`.
//!
//! Within one event the work is sequential. Writes are committed once at
//! the end of the event, then the last-index dates of the written entities
//! are stamped. An entity that disappeared between resolution and stamping
//! has its fresh document removed again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use docintel_types::{ChangeEvent, Permission};

use crate::context::{AmbientContext, ContextFactory};
use crate::error::{EntityKind, IndexingError};
use crate::log_event::LogEvent;
use crate::updater::{FacetIndexingUtility, TagIndexingUtility, UpdateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Add,
    Update,
}

/// Which step of the index protocol failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Write,
    Remove,
    Stamp,
}

impl Stage {
    fn log_event(self) -> LogEvent {
        match self {
            Stage::Write => LogEvent::IndexUpdateFailed,
            Stage::Remove => LogEvent::IndexRemoveFailed,
            Stage::Stamp => LogEvent::StampFailed,
        }
    }
}

/// Log a per-entity failure with the category matching its kind.
///
/// Returns `true` for expected outcomes (the entity is skipped) and
/// `false` for failures.
pub(crate) fn log_failure(operation: &str, stage: Stage, kind: EntityKind, id: Uuid, err: &IndexingError) -> bool {
    match err {
        IndexingError::NotFound { .. } => {
            warn!(
                log_event = %LogEvent::EntityNotFound,
                operation,
                entity = %kind,
                id = %id,
                reason = %err,
                "Entity no longer exists, skipping"
            );
            true
        }
        IndexingError::Unauthorized { .. } => {
            warn!(
                log_event = %LogEvent::Unauthorized,
                operation,
                entity = %kind,
                id = %id,
                reason = %err,
                "Automation identity not allowed, skipping"
            );
            true
        }
        IndexingError::Timeout { .. } => {
            warn!(
                log_event = %LogEvent::Timeout,
                operation,
                entity = %kind,
                id = %id,
                error = %err,
                "Index operation timed out"
            );
            false
        }
        _ => {
            warn!(
                log_event = %stage.log_event(),
                operation,
                entity = %kind,
                id = %id,
                error = ?err,
                "Index operation failed"
            );
            false
        }
    }
}

/// Log a per-entity failure and count it in `result`.
pub(crate) fn record_failure(
    result: &mut UpdateResult,
    operation: &str,
    stage: Stage,
    kind: EntityKind,
    id: Uuid,
    err: &IndexingError,
) {
    if log_failure(operation, stage, kind, id, err) {
        result.record_skip();
    } else {
        result.record_error();
    }
}

/// Writes waiting for the end-of-event commit.
#[derive(Debug, Default)]
struct Pending {
    tags: Vec<Uuid>,
    facets: Vec<Uuid>,
    removed_tags: Vec<Uuid>,
    removed_facets: Vec<Uuid>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.facets.is_empty()
            && self.removed_tags.is_empty()
            && self.removed_facets.is_empty()
    }

    fn len(&self) -> usize {
        self.tags.len() + self.facets.len() + self.removed_tags.len() + self.removed_facets.len()
    }

    fn touches_tags(&self) -> bool {
        !self.tags.is_empty() || !self.removed_tags.is_empty()
    }

    fn touches_facets(&self) -> bool {
        !self.facets.is_empty() || !self.removed_facets.is_empty()
    }
}

/// Handles change events against the search index.
pub struct IndexingConsumer {
    factory: Arc<dyn ContextFactory>,
    tags: Arc<dyn TagIndexingUtility>,
    facets: Arc<dyn FacetIndexingUtility>,
}

impl IndexingConsumer {
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        tags: Arc<dyn TagIndexingUtility>,
        facets: Arc<dyn FacetIndexingUtility>,
    ) -> Self {
        Self {
            factory,
            tags,
            facets,
        }
    }

    /// Handle one event with its own ambient context.
    ///
    /// Never fails; the outcome of every touched entity is counted in the
    /// returned result.
    pub async fn handle(&self, event: &ChangeEvent) -> UpdateResult {
        let mut result = UpdateResult::new();
        let operation = event.kind();

        let ctx = match self.factory.new_scope().await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(
                    log_event = %LogEvent::ContextFailed,
                    operation,
                    id = %event.subject_id(),
                    error = %e,
                    "Could not create ambient context"
                );
                result.record_error();
                return result;
            }
        };

        let mut pending = Pending::default();

        match event {
            ChangeEvent::TagCreated(m) => {
                self.write_tag(&ctx, operation, m.tag_id, WriteMode::Add, &mut pending, &mut result)
                    .await;
            }
            ChangeEvent::TagUpdated(m) => {
                self.write_tag(&ctx, operation, m.tag_id, WriteMode::Update, &mut pending, &mut result)
                    .await;
            }
            ChangeEvent::TagRemoved(m) => {
                self.remove_tag(operation, m.tag_id, &mut pending, &mut result).await;
            }
            ChangeEvent::TagMerged(m) => {
                self.write_tag(
                    &ctx,
                    operation,
                    m.retained_tag_id,
                    WriteMode::Update,
                    &mut pending,
                    &mut result,
                )
                .await;
                self.remove_tag(operation, m.removed_tag_id, &mut pending, &mut result).await;
            }
            ChangeEvent::FacetCreated(m) => {
                self.write_facet(&ctx, operation, m.facet_tag_id, WriteMode::Add, &mut pending, &mut result)
                    .await;
            }
            ChangeEvent::FacetUpdated(m) => {
                self.write_facet(
                    &ctx,
                    operation,
                    m.facet_tag_id,
                    WriteMode::Update,
                    &mut pending,
                    &mut result,
                )
                .await;
                match ctx.store().tags_for_facet(m.facet_tag_id).await {
                    Ok(owned) => {
                        for tag in owned {
                            self.write_tag(
                                &ctx,
                                operation,
                                tag.tag_id,
                                WriteMode::Update,
                                &mut pending,
                                &mut result,
                            )
                            .await;
                        }
                    }
                    Err(e) => record_failure(
                        &mut result,
                        operation,
                        Stage::Write,
                        EntityKind::Facet,
                        m.facet_tag_id,
                        &e,
                    ),
                }
            }
            ChangeEvent::FacetRemoved(m) => {
                self.remove_facet(operation, m.facet_tag_id, &mut pending, &mut result).await;
                for tag_id in &m.tags {
                    self.remove_tag(operation, *tag_id, &mut pending, &mut result).await;
                }
            }
            ChangeEvent::FacetMerged(m) => {
                self.write_facet(
                    &ctx,
                    operation,
                    m.retained_facet_id,
                    WriteMode::Update,
                    &mut pending,
                    &mut result,
                )
                .await;
                self.remove_facet(operation, m.removed_facet_id, &mut pending, &mut result)
                    .await;
                for tag_id in &m.tags {
                    self.write_tag(&ctx, operation, *tag_id, WriteMode::Update, &mut pending, &mut result)
                        .await;
                }
            }
        }

        self.flush(&ctx, operation, pending, &mut result).await;

        debug!(
            operation,
            id = %event.subject_id(),
            processed = result.processed,
            skipped = result.skipped,
            errors = result.errors,
            "Handled change event"
        );
        result
    }

    async fn write_tag(
        &self,
        ctx: &AmbientContext,
        operation: &str,
        tag_id: Uuid,
        mode: WriteMode,
        pending: &mut Pending,
        result: &mut UpdateResult,
    ) {
        let resolved = match ctx.store().require(Permission::IndexTags, EntityKind::Tag, tag_id) {
            Ok(()) => ctx.store().get_tag_with_facet(tag_id).await,
            Err(e) => Err(e),
        };
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                record_failure(result, operation, Stage::Write, EntityKind::Tag, tag_id, &e);
                return;
            }
        };

        let written = match mode {
            WriteMode::Add => self.tags.add(&resolved).await,
            WriteMode::Update => self.tags.update(&resolved).await,
        };
        match written {
            Ok(()) => pending.tags.push(tag_id),
            Err(e) => record_failure(result, operation, Stage::Write, EntityKind::Tag, tag_id, &e),
        }
    }

    async fn write_facet(
        &self,
        ctx: &AmbientContext,
        operation: &str,
        facet_id: Uuid,
        mode: WriteMode,
        pending: &mut Pending,
        result: &mut UpdateResult,
    ) {
        let facet = match ctx.store().require(Permission::IndexFacets, EntityKind::Facet, facet_id) {
            Ok(()) => ctx.store().get_facet(facet_id).await,
            Err(e) => Err(e),
        };
        let facet = match facet {
            Ok(facet) => facet,
            Err(e) => {
                record_failure(result, operation, Stage::Write, EntityKind::Facet, facet_id, &e);
                return;
            }
        };

        let written = match mode {
            WriteMode::Add => self.facets.add(&facet).await,
            WriteMode::Update => self.facets.update(&facet).await,
        };
        match written {
            Ok(()) => pending.facets.push(facet_id),
            Err(e) => record_failure(result, operation, Stage::Write, EntityKind::Facet, facet_id, &e),
        }
    }

    async fn remove_tag(&self, operation: &str, tag_id: Uuid, pending: &mut Pending, result: &mut UpdateResult) {
        match self.tags.remove(tag_id).await {
            Ok(()) => pending.removed_tags.push(tag_id),
            Err(e) => record_failure(result, operation, Stage::Remove, EntityKind::Tag, tag_id, &e),
        }
    }

    async fn remove_facet(&self, operation: &str, facet_id: Uuid, pending: &mut Pending, result: &mut UpdateResult) {
        match self.facets.remove(facet_id).await {
            Ok(()) => pending.removed_facets.push(facet_id),
            Err(e) => record_failure(result, operation, Stage::Remove, EntityKind::Facet, facet_id, &e),
        }
    }

    async fn commit(&self, pending: &Pending) -> Result<(), IndexingError> {
        if pending.touches_tags() {
            self.tags.commit().await?;
        }
        if pending.touches_facets() {
            self.facets.commit().await?;
        }
        Ok(())
    }

    /// Commit the event's writes, then stamp what was written.
    async fn flush(&self, ctx: &AmbientContext, operation: &str, pending: Pending, result: &mut UpdateResult) {
        if pending.is_empty() {
            return;
        }

        if let Err(e) = self.commit(&pending).await {
            let log_event = match e {
                IndexingError::Timeout { .. } => LogEvent::Timeout,
                _ => LogEvent::IndexUpdateFailed,
            };
            warn!(
                log_event = %log_event,
                operation,
                entities = pending.len(),
                error = ?e,
                "Index commit failed, nothing stamped"
            );
            result.errors += pending.len();
            return;
        }

        result.processed += pending.removed_tags.len() + pending.removed_facets.len();

        let now = Utc::now();
        let mut retracted = Pending::default();

        for tag_id in pending.tags {
            match ctx.store().stamp_tag(tag_id, now).await {
                Ok(()) => result.record_success(),
                Err(e) if e.is_not_found() => {
                    record_failure(result, operation, Stage::Stamp, EntityKind::Tag, tag_id, &e);
                    self.remove_tag(operation, tag_id, &mut retracted, result).await;
                }
                Err(e) => record_failure(result, operation, Stage::Stamp, EntityKind::Tag, tag_id, &e),
            }
        }

        for facet_id in pending.facets {
            match ctx.store().stamp_facet(facet_id, now).await {
                Ok(()) => result.record_success(),
                Err(e) if e.is_not_found() => {
                    record_failure(result, operation, Stage::Stamp, EntityKind::Facet, facet_id, &e);
                    self.remove_facet(operation, facet_id, &mut retracted, result).await;
                }
                Err(e) => record_failure(result, operation, Stage::Stamp, EntityKind::Facet, facet_id, &e),
            }
        }

        if !retracted.is_empty() {
            if let Err(e) = self.commit(&retracted).await {
                warn!(
                    log_event = %LogEvent::IndexRemoveFailed,
                    operation,
                    entities = retracted.len(),
                    error = ?e,
                    "Failed to retract documents of vanished entities"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingTagUtility, Fixture, VanishingTagUtility};
    use docintel_search::Collection;
    use docintel_types::{
        FacetCreatedMessage, FacetMergedMessage, FacetRemovedMessage, FacetUpdatedMessage, Permission,
        TagCreatedMessage, TagMergedMessage, TagRemovedMessage, TagUpdatedMessage,
    };

    #[tokio::test]
    async fn test_tag_created_indexes_and_stamps() {
        let fx = Fixture::new();
        let facet = fx.facet("Malware", Some("malware"));
        let tag = fx.tag("Emotet", facet.facet_id);

        let result = fx
            .consumer()
            .handle(&TagCreatedMessage { tag_id: tag.tag_id }.into())
            .await;

        assert_eq!(result.processed, 1);
        let doc = fx.indexed_tag(tag.tag_id).unwrap();
        assert_eq!(doc.friendly_name, "malware:Emotet");
        assert_eq!(doc.facet_id, facet.facet_id);
        assert!(fx.storage.get_tag(tag.tag_id).unwrap().unwrap().last_index_date.is_some());
        assert_eq!(fx.factory.open_scopes(), 0);
    }

    #[tokio::test]
    async fn test_missing_tag_is_skipped() {
        let fx = Fixture::new();
        let result = fx
            .consumer()
            .handle(&TagUpdatedMessage { tag_id: Uuid::new_v4() }.into())
            .await;

        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors, 0);
        assert_eq!(fx.count(Collection::Tag), 0);
    }

    #[tokio::test]
    async fn test_tag_removed_is_idempotent() {
        let fx = Fixture::new();
        let facet = fx.facet("Malware", Some("malware"));
        let tag = fx.tag("Emotet", facet.facet_id);
        let consumer = fx.consumer();
        consumer.handle(&TagCreatedMessage { tag_id: tag.tag_id }.into()).await;

        let removed: ChangeEvent = TagRemovedMessage { tag_id: tag.tag_id }.into();
        assert_eq!(consumer.handle(&removed).await.processed, 1);
        assert_eq!(consumer.handle(&removed).await.processed, 1);
        assert!(fx.indexed_tag(tag.tag_id).is_none());
    }

    #[tokio::test]
    async fn test_tag_merged_keeps_retained_only() {
        let fx = Fixture::new();
        let facet = fx.facet("Malware", Some("malware"));
        let retained = fx.tag("Emotet", facet.facet_id);
        let removed = fx.tag("Geodo", facet.facet_id);
        let consumer = fx.consumer();
        consumer.handle(&TagCreatedMessage { tag_id: removed.tag_id }.into()).await;

        fx.storage.merge_tags(retained.tag_id, removed.tag_id).unwrap();
        let result = consumer
            .handle(
                &TagMergedMessage {
                    retained_tag_id: retained.tag_id,
                    removed_tag_id: removed.tag_id,
                }
                .into(),
            )
            .await;

        assert_eq!(result.processed, 2);
        assert!(fx.indexed_tag(retained.tag_id).is_some());
        assert!(fx.indexed_tag(removed.tag_id).is_none());
    }

    #[tokio::test]
    async fn test_facet_updated_fans_out() {
        let fx = Fixture::new();
        let mut facet = fx.facet("Malware", Some("malware"));
        let tags: Vec<_> = ["Emotet", "TrickBot", "Qakbot"]
            .iter()
            .map(|label| fx.tag(label, facet.facet_id))
            .collect();

        facet.prefix = Some("family".to_string());
        fx.storage.put_facet(&facet).unwrap();

        let result = fx
            .consumer()
            .handle(&FacetUpdatedMessage { facet_tag_id: facet.facet_id }.into())
            .await;

        assert_eq!(result.processed, 4);
        for tag in &tags {
            let doc = fx.indexed_tag(tag.tag_id).unwrap();
            assert_eq!(doc.friendly_name, format!("family:{}", tag.label));
        }
        let indexed_facet = fx.indexed_facet(facet.facet_id).unwrap();
        assert_eq!(indexed_facet.prefix.as_deref(), Some("family"));
        assert!(fx.storage.get_facet(facet.facet_id).unwrap().unwrap().last_index_date.is_some());
    }

    #[tokio::test]
    async fn test_facet_removed_drops_facet_and_tags() {
        let fx = Fixture::new();
        let facet = fx.facet("Malware", Some("malware"));
        let t1 = fx.tag("Emotet", facet.facet_id);
        let t2 = fx.tag("TrickBot", facet.facet_id);
        let consumer = fx.consumer();
        consumer
            .handle(&FacetUpdatedMessage { facet_tag_id: facet.facet_id }.into())
            .await;
        assert_eq!(fx.count(Collection::Tag), 2);

        let removed_tags = fx.storage.delete_facet(facet.facet_id).unwrap();
        let result = consumer
            .handle(
                &FacetRemovedMessage {
                    facet_tag_id: facet.facet_id,
                    tags: removed_tags,
                }
                .into(),
            )
            .await;

        assert_eq!(result.processed, 3);
        assert_eq!(fx.count(Collection::Tag), 0);
        assert_eq!(fx.count(Collection::Facet), 0);
        assert!(fx.indexed_tag(t1.tag_id).is_none());
        assert!(fx.indexed_tag(t2.tag_id).is_none());
    }

    #[tokio::test]
    async fn test_facet_merged_moves_tags() {
        let fx = Fixture::new();
        let retained = fx.facet("Malware", Some("malware"));
        let removed = fx.facet("Families", Some("family"));
        let moved = fx.tag("Emotet", removed.facet_id);
        let consumer = fx.consumer();
        consumer
            .handle(&FacetUpdatedMessage { facet_tag_id: removed.facet_id }.into())
            .await;

        let tags = fx.storage.merge_facets(retained.facet_id, removed.facet_id).unwrap();
        let result = consumer
            .handle(
                &FacetMergedMessage {
                    retained_facet_id: retained.facet_id,
                    removed_facet_id: removed.facet_id,
                    tags,
                }
                .into(),
            )
            .await;

        assert_eq!(result.errors, 0);
        assert!(fx.indexed_facet(retained.facet_id).is_some());
        assert!(fx.indexed_facet(removed.facet_id).is_none());
        let doc = fx.indexed_tag(moved.tag_id).unwrap();
        assert_eq!(doc.facet_id, retained.facet_id);
        assert_eq!(doc.friendly_name, "malware:Emotet");
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stamp() {
        let fx = Fixture::new();
        let facet = fx.facet("Malware", Some("malware"));
        let good = fx.tag("Emotet", facet.facet_id);
        let bad = fx.tag("TrickBot", facet.facet_id);

        let consumer = IndexingConsumer::new(
            fx.factory.clone(),
            Arc::new(FailingTagUtility::new(fx.tags.clone(), vec![bad.tag_id])),
            fx.facets.clone(),
        );
        let result = consumer
            .handle(&FacetUpdatedMessage { facet_tag_id: facet.facet_id }.into())
            .await;

        assert_eq!(result.errors, 1);
        assert_eq!(result.processed, 2);
        assert!(fx.indexed_tag(good.tag_id).is_some());
        assert!(fx.indexed_tag(bad.tag_id).is_none());
        assert!(fx.storage.get_tag(bad.tag_id).unwrap().unwrap().last_index_date.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_identity_is_skipped() {
        let fx = Fixture::with_permissions(vec![Permission::ViewFacets]);
        let facet = fx.facet("Malware", Some("malware"));
        let tag = fx.tag("Emotet", facet.facet_id);

        let result = fx
            .consumer()
            .handle(&TagCreatedMessage { tag_id: tag.tag_id }.into())
            .await;

        assert_eq!(result.skipped, 1);
        assert!(fx.indexed_tag(tag.tag_id).is_none());
    }

    #[tokio::test]
    async fn test_view_only_identity_does_not_write() {
        let fx = Fixture::with_permissions(vec![Permission::ViewTags, Permission::ViewFacets]);
        let facet = fx.facet("Malware", Some("malware"));
        let tag = fx.tag("Emotet", facet.facet_id);
        let consumer = fx.consumer();

        let tag_result = consumer
            .handle(&TagCreatedMessage { tag_id: tag.tag_id }.into())
            .await;
        let facet_result = consumer
            .handle(&FacetCreatedMessage { facet_tag_id: facet.facet_id }.into())
            .await;

        assert_eq!(tag_result.skipped, 1);
        assert_eq!(tag_result.errors, 0);
        assert_eq!(facet_result.skipped, 1);
        assert_eq!(fx.count(Collection::Tag), 0);
        assert_eq!(fx.count(Collection::Facet), 0);
        assert!(fx.storage.get_tag(tag.tag_id).unwrap().unwrap().last_index_date.is_none());
    }

    #[tokio::test]
    async fn test_tag_deleted_during_write_is_retracted() {
        let fx = Fixture::new();
        let facet = fx.facet("Malware", Some("malware"));
        let kept = fx.tag("Emotet", facet.facet_id);
        let vanishing = fx.tag("TrickBot", facet.facet_id);

        let consumer = IndexingConsumer::new(
            fx.factory.clone(),
            Arc::new(VanishingTagUtility::new(
                fx.tags.clone(),
                fx.storage.clone(),
                vec![vanishing.tag_id],
            )),
            fx.facets.clone(),
        );

        let result = consumer
            .handle(&TagUpdatedMessage { tag_id: vanishing.tag_id }.into())
            .await;
        assert_eq!(result.skipped, 1);
        assert_eq!(result.processed, 0);
        assert_eq!(result.errors, 0);
        assert!(fx.indexed_tag(vanishing.tag_id).is_none());
        assert!(fx.storage.get_tag(vanishing.tag_id).unwrap().is_none());

        let result = consumer
            .handle(&TagCreatedMessage { tag_id: kept.tag_id }.into())
            .await;
        assert_eq!(result.processed, 1);
        assert!(fx.indexed_tag(kept.tag_id).is_some());
        assert_eq!(fx.count(Collection::Tag), 1);
    }

    #[tokio::test]
    async fn test_missing_automation_user_counts_error() {
        let fx = Fixture::without_user();
        let result = fx
            .consumer()
            .handle(&TagCreatedMessage { tag_id: Uuid::new_v4() }.into())
            .await;
        assert_eq!(result.errors, 1);
        assert_eq!(result.processed, 0);
    }
}
