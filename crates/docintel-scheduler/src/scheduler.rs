//! Scheduler service wrapper around tokio-cron-scheduler.
//!
//! Provides lifecycle management for interval jobs: single-flight runs,
//! optional per-run timeout, registry bookkeeping and a shutdown that
//! waits for in-flight runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::overlap::OverlapGuard;
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::{JobOptions, SchedulerConfig, SchedulerError};

/// Service wrapper around JobScheduler for lifecycle management.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
    registry: Arc<JobRegistry>,
    guards: Mutex<HashMap<String, OverlapGuard>>,
}

impl SchedulerService {
    /// Create a new scheduler service with the given configuration.
    ///
    /// The scheduler is created but not started. Call `start()` to begin
    /// executing scheduled jobs.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
            registry: Arc::new(JobRegistry::new()),
            guards: Mutex::new(HashMap::new()),
        })
    }

    /// Start the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if the scheduler is already started.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");

        Ok(())
    }

    /// Shutdown the scheduler gracefully.
    ///
    /// Stops future ticks, signals jobs via the cancellation token, then
    /// waits up to `shutdown_timeout_secs` for in-flight runs to finish.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotRunning` if the scheduler is not started.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error during scheduler shutdown");
        }
        self.shutdown_token.cancel();

        let timeout = self.config.shutdown_timeout();
        let started = Instant::now();
        let guards: Vec<(String, OverlapGuard)> = self
            .guards
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, guard)| (name.clone(), guard.clone()))
            .collect();

        for (name, guard) in guards {
            if !guard.is_running() {
                continue;
            }
            info!(job = %name, "Waiting for in-flight run to finish");
            let remaining = timeout.saturating_sub(started.elapsed());
            if !guard.wait_idle(remaining).await {
                warn!(
                    job = %name,
                    timeout_secs = timeout.as_secs(),
                    "In-flight run did not finish before shutdown timeout"
                );
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");

        Ok(())
    }

    /// Get a clone of the shutdown token for job cancellation.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Shared job registry.
    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a job that runs every `options.interval`.
    ///
    /// Runs never overlap: a tick arriving while the previous run is still
    /// active is skipped and recorded as such. The job receives a clone of
    /// the shutdown token.
    ///
    /// # Errors
    ///
    /// Returns error if the interval is zero or a job with the same name
    /// is already registered.
    ///
    /// # Example
    ///
    /// ```ignore
    /// scheduler.register_interval_job(
    ///     "reconciliation_sweep",
    ///     JobOptions::every(Duration::from_secs(300)),
    ///     |_token| async { Ok(JobOutput::new()) },
    /// ).await?;
    /// ```
    pub async fn register_interval_job<F, Fut>(
        &self,
        name: &str,
        options: JobOptions,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        if options.interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(name.to_string()));
        }
        if self.registry.is_registered(name) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }

        let guard = OverlapGuard::new();
        let job_name = name.to_string();
        let shutdown_token = self.shutdown_token.clone();
        let registry = self.registry.clone();
        let job_options = options.clone();
        let job_guard = guard.clone();

        let job = Job::new_repeated_async(options.interval, move |_uuid, _lock| {
            let name = job_name.clone();
            let token = shutdown_token.clone();
            let job_fn = job_fn.clone();
            let registry = registry.clone();
            let options = job_options.clone();
            let guard = job_guard.clone();

            Box::pin(async move {
                if token.is_cancelled() {
                    return;
                }
                run_guarded(&name, &options, &guard, &registry, token, job_fn).await;
            })
        })?;

        let uuid = self.scheduler.add(job).await?;

        self.registry.register(name, &options.describe());
        if let Ok(interval) = chrono::Duration::from_std(options.interval) {
            self.registry.set_next_run(name, Utc::now() + interval);
        }
        self.guards
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), guard);

        info!(
            job = %name,
            uuid = %uuid,
            schedule = %options.describe(),
            timeout_secs = options.timeout.map(|t| t.as_secs()),
            "Job registered"
        );

        Ok(uuid)
    }

    #[cfg(test)]
    fn guard(&self, name: &str) -> Option<OverlapGuard> {
        self.guards.lock().unwrap().get(name).cloned()
    }
}

/// Execute one tick of a job under its overlap guard.
pub(crate) async fn run_guarded<F, Fut>(
    name: &str,
    options: &JobOptions,
    guard: &OverlapGuard,
    registry: &JobRegistry,
    token: CancellationToken,
    job_fn: F,
) -> JobResult
where
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<JobOutput, String>>,
{
    let Some(_run) = guard.try_acquire() else {
        warn!(
            job = %name,
            log_event = options.skip_event,
            "Previous run still active, skipping"
        );
        let result = JobResult::Skipped("previous run still active".to_string());
        registry.record_complete(name, result.clone(), 0);
        return result;
    };

    registry.record_start(name);
    info!(job = %name, "Job started");
    let start = Instant::now();

    let outcome = match options.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, job_fn(token)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        },
        None => job_fn(token).await,
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(output) => {
            registry.record_complete_with_metadata(name, JobResult::Success, duration_ms, output.metadata);
            info!(job = %name, duration_ms, "Job completed");
            JobResult::Success
        }
        Err(e) => {
            warn!(job = %name, duration_ms, error = %e, "Job failed");
            registry.record_complete(name, JobResult::Failed(e.clone()), duration_ms);
            JobResult::Failed(e)
        }
    };

    if let Ok(interval) = chrono::Duration::from_std(options.interval) {
        registry.set_next_run(name, Utc::now() + interval);
    }
    result
}
