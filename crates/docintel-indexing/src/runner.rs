//! Consumer run loop.
//!
//! Pulls deliveries from an [`EventSource`] and hands each decoded event to
//! the [`IndexingConsumer`] on a bounded pool of tokio tasks. Every task
//! opens its own ambient context through the consumer.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use docintel_bus::EventSource;

use crate::consumer::IndexingConsumer;
use crate::error::IndexingError;
use crate::log_event::LogEvent;
use crate::updater::UpdateResult;

/// Totals of one run of the loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunnerStats {
    /// Deliveries pulled from the source
    pub received: usize,
    /// Deliveries dropped because they could not be decoded
    pub malformed: usize,
    /// Aggregated per-entity outcomes of the handled events
    pub result: UpdateResult,
}

pub struct ConsumerRunner {
    consumer: Arc<IndexingConsumer>,
    max_concurrent: usize,
}

impl ConsumerRunner {
    pub fn new(consumer: Arc<IndexingConsumer>, max_concurrent: usize) -> Self {
        Self {
            consumer,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Consume until the source closes or `cancel` fires.
    ///
    /// In-flight handlers are always drained before returning. A failing
    /// source ends the loop with `IndexingError::Source`.
    pub async fn run<S: EventSource>(
        &self,
        mut source: S,
        cancel: CancellationToken,
    ) -> Result<RunnerStats, IndexingError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers: JoinSet<UpdateResult> = JoinSet::new();
        let mut stats = RunnerStats::default();
        let mut failure = None;

        info!(
            source = %source.describe(),
            max_concurrent = self.max_concurrent,
            "Consumer started"
        );

        loop {
            while let Some(joined) = workers.try_join_next() {
                collect(&mut stats, joined);
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = source.next() => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    stats.received += 1;
                    match delivery.decode() {
                        Ok(event) => {
                            let consumer = self.consumer.clone();
                            workers.spawn(async move {
                                let _permit = permit;
                                consumer.handle(&event).await
                            });
                        }
                        Err(e) => {
                            warn!(
                                log_event = %LogEvent::MalformedMessage,
                                subject = %delivery.subject,
                                error = %e,
                                "Dropping malformed message"
                            );
                            stats.malformed += 1;
                        }
                    }
                }
                Ok(None) => {
                    info!("Event source closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Event source failed");
                    failure = Some(IndexingError::Source(e.to_string()));
                    break;
                }
            }
        }

        debug!(in_flight = workers.len(), "Draining consumer workers");
        while let Some(joined) = workers.join_next().await {
            collect(&mut stats, joined);
        }

        info!(
            received = stats.received,
            malformed = stats.malformed,
            processed = stats.result.processed,
            skipped = stats.result.skipped,
            errors = stats.result.errors,
            "Consumer stopped"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

fn collect(stats: &mut RunnerStats, joined: Result<UpdateResult, JoinError>) {
    match joined {
        Ok(result) => stats.result.merge(&result),
        Err(e) => {
            error!(error = %e, "Event handler task failed");
            stats.result.record_error();
        }
    }
}
