//! Reconciliation sweep.
//!
//! Finds every stale tag in the entity store and re-indexes it, so the
//! index converges even when events were lost or failed. Tags are
//! processed one after another. Every `commit_interval` tags the index is
//! committed and the batch is stamped, so a crash mid-sweep loses at most
//! one batch of bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use docintel_types::{Permission, StalenessPolicy};

use crate::consumer::{record_failure, Stage};
use crate::context::{AmbientContext, ContextFactory};
use crate::error::{EntityKind, IndexingError};
use crate::log_event::LogEvent;
use crate::updater::{TagIndexingUtility, UpdateResult};

const OPERATION: &str = "sweep";

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepResult {
    /// Tags found stale at the start of the sweep
    pub stale: usize,
    pub result: UpdateResult,
    pub duration: Duration,
}

pub struct ReconciliationSweeper {
    factory: Arc<dyn ContextFactory>,
    tags: Arc<dyn TagIndexingUtility>,
    policy: StalenessPolicy,
    commit_interval: usize,
}

impl ReconciliationSweeper {
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        tags: Arc<dyn TagIndexingUtility>,
        policy: StalenessPolicy,
        commit_interval: usize,
    ) -> Self {
        Self {
            factory,
            tags,
            policy,
            commit_interval: commit_interval.max(1),
        }
    }

    pub fn policy(&self) -> StalenessPolicy {
        self.policy
    }

    /// Run one sweep with a fresh ambient context.
    ///
    /// Per-tag failures are logged and counted. Only a failure to open the
    /// context or to query the stale tags ends the sweep with an error.
    pub async fn run_once(&self) -> Result<SweepResult, IndexingError> {
        let started = Instant::now();
        let ctx = self.factory.new_scope().await?;

        let stale = ctx.store().find_stale_tags(self.policy).await?;
        info!(
            log_event = %LogEvent::SweepStarted,
            stale = stale.len(),
            max_delay_minutes = self.policy.max_delay.num_minutes(),
            "Reconciliation sweep started"
        );

        let mut result = UpdateResult::new();
        let mut pending = Vec::with_capacity(self.commit_interval);

        for tag in &stale {
            let resolved = match ctx.store().require(Permission::IndexTags, EntityKind::Tag, tag.tag_id) {
                Ok(()) => ctx.store().get_tag_with_facet(tag.tag_id).await,
                Err(e) => Err(e),
            };
            let resolved = match resolved {
                Ok(resolved) => resolved,
                Err(e) => {
                    record_failure(&mut result, OPERATION, Stage::Write, EntityKind::Tag, tag.tag_id, &e);
                    continue;
                }
            };

            match self.tags.update(&resolved).await {
                Ok(()) => pending.push(tag.tag_id),
                Err(e) => {
                    record_failure(&mut result, OPERATION, Stage::Write, EntityKind::Tag, tag.tag_id, &e);
                    continue;
                }
            }

            if pending.len() >= self.commit_interval {
                self.flush(&ctx, std::mem::take(&mut pending), &mut result).await;
            }
        }
        self.flush(&ctx, pending, &mut result).await;

        let sweep = SweepResult {
            stale: stale.len(),
            result,
            duration: started.elapsed(),
        };
        info!(
            log_event = %LogEvent::SweepCompleted,
            stale = sweep.stale,
            processed = sweep.result.processed,
            skipped = sweep.result.skipped,
            errors = sweep.result.errors,
            duration_ms = sweep.duration.as_millis() as u64,
            "Reconciliation sweep completed"
        );
        Ok(sweep)
    }

    /// Commit a batch of updated tags and stamp them.
    async fn flush(&self, ctx: &AmbientContext, batch: Vec<Uuid>, result: &mut UpdateResult) {
        if batch.is_empty() {
            return;
        }

        if let Err(e) = self.tags.commit().await {
            let log_event = match e {
                IndexingError::Timeout { .. } => LogEvent::Timeout,
                _ => LogEvent::IndexUpdateFailed,
            };
            warn!(
                log_event = %log_event,
                operation = OPERATION,
                tags = batch.len(),
                error = ?e,
                "Index commit failed, batch left stale"
            );
            result.errors += batch.len();
            return;
        }

        let missing = match ctx.store().stamp_tags(batch.clone(), Utc::now()).await {
            Ok(missing) => missing,
            Err(e) => {
                warn!(
                    log_event = %LogEvent::StampFailed,
                    operation = OPERATION,
                    tags = batch.len(),
                    error = ?e,
                    "Failed to stamp swept tags"
                );
                result.errors += batch.len();
                return;
            }
        };

        result.processed += batch.len() - missing.len();
        if missing.is_empty() {
            return;
        }

        for tag_id in &missing {
            let gone = IndexingError::NotFound {
                kind: EntityKind::Tag,
                id: *tag_id,
            };
            record_failure(result, OPERATION, Stage::Stamp, EntityKind::Tag, *tag_id, &gone);
            if let Err(e) = self.tags.remove(*tag_id).await {
                warn!(
                    log_event = %LogEvent::IndexRemoveFailed,
                    operation = OPERATION,
                    id = %tag_id,
                    error = ?e,
                    "Failed to retract document of deleted tag"
                );
            }
        }
        if let Err(e) = self.tags.commit().await {
            warn!(
                log_event = %LogEvent::IndexRemoveFailed,
                operation = OPERATION,
                error = ?e,
                "Failed to commit retractions"
            );
        }
    }
}
