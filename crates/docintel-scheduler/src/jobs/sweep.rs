//! Reconciliation sweep scheduled job.
//!
//! Runs the `ReconciliationSweeper` on a fixed interval. Ticks that land
//! while a sweep is still running are skipped with a `sweep_skipped` log
//! event, so two sweeps never run at the same time.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docintel_indexing::{LogEvent, ReconciliationSweeper};

use crate::{JobOptions, JobOutput, SchedulerError, SchedulerService};

/// Name the sweep job is registered under.
pub const SWEEP_JOB_NAME: &str = "reconciliation_sweep";

/// Configuration for the sweep job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepJobConfig {
    /// Seconds between two sweeps (default: 300)
    pub interval_secs: u64,

    /// Upper bound for one sweep in seconds (default: 0 = no bound)
    ///
    /// A sweep that hits the bound is abandoned. Tags it had not stamped
    /// yet are still stale and get picked up by the next sweep.
    pub timeout_secs: u64,
}

impl Default for SweepJobConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            timeout_secs: 0,
        }
    }
}

impl SweepJobConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs();
        self
    }

    /// Set the timeout in seconds. 0 disables it.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn to_job_options(&self) -> JobOptions {
        let options = JobOptions::every(Duration::from_secs(self.interval_secs))
            .with_skip_event(LogEvent::SweepSkipped.as_str());
        if self.timeout_secs > 0 {
            options.with_timeout(Duration::from_secs(self.timeout_secs))
        } else {
            options
        }
    }
}

/// Register the reconciliation sweep with the scheduler.
///
/// # Errors
///
/// Returns error if the interval is zero or the job is already registered.
///
/// # Example
///
/// ```ignore
/// let sweeper = Arc::new(ReconciliationSweeper::new(factory, tags, policy, 50));
/// create_sweep_job(&scheduler, sweeper, SweepJobConfig::default()).await?;
/// ```
pub async fn create_sweep_job(
    scheduler: &SchedulerService,
    sweeper: Arc<ReconciliationSweeper>,
    config: SweepJobConfig,
) -> Result<(), SchedulerError> {
    scheduler
        .register_interval_job(SWEEP_JOB_NAME, config.to_job_options(), move |_token| {
            let sweeper = sweeper.clone();
            async move { run_sweep_job(&sweeper).await }
        })
        .await?;

    info!(
        interval_secs = config.interval_secs,
        timeout_secs = config.timeout_secs,
        "Registered reconciliation sweep job"
    );
    Ok(())
}

/// Execute one sweep and report its counters.
///
/// The shutdown token is not consulted: a started sweep finishes, and
/// shutdown waits for it up to its own timeout.
async fn run_sweep_job(sweeper: &ReconciliationSweeper) -> Result<JobOutput, String> {
    debug!("Starting sweep job run");

    let sweep = sweeper
        .run_once()
        .await
        .map_err(|e| format!("Sweep failed: {}", e))?;

    Ok(JobOutput::new()
        .with_metadata("stale", sweep.stale)
        .with_metadata("processed", sweep.result.processed)
        .with_metadata("skipped", sweep.result.skipped)
        .with_metadata("errors", sweep.result.errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docintel_indexing::{AutomationContextFactory, TantivyTagIndexingUtility};
    use docintel_search::{SearchIndex, SearchIndexer};
    use docintel_storage::Storage;
    use docintel_types::{AutomationUser, Facet, StalenessPolicy, Tag};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sweeper(storage: Arc<Storage>) -> Arc<ReconciliationSweeper> {
        let timeout = Duration::from_secs(5);
        let index = SearchIndex::create_in_ram();
        let indexer = Arc::new(SearchIndexer::new(&index).unwrap());
        Arc::new(ReconciliationSweeper::new(
            Arc::new(AutomationContextFactory::new(storage, "automation", timeout)),
            Arc::new(TantivyTagIndexingUtility::new(indexer, timeout)),
            StalenessPolicy::from_minutes(10),
            10,
        ))
    }

    #[test]
    fn test_default_config() {
        let config = SweepJobConfig::default();
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.timeout_secs, 0);

        let options = config.to_job_options();
        assert_eq!(options.interval, Duration::from_secs(300));
        assert!(options.timeout.is_none());
        assert_eq!(options.skip_event, "sweep_skipped");
    }

    #[test]
    fn test_config_builder() {
        let config = SweepJobConfig::default()
            .with_interval(Duration::from_secs(60))
            .with_timeout(120);

        let options = config.to_job_options();
        assert_eq!(options.interval, Duration::from_secs(60));
        assert_eq!(options.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_config_serialization() {
        let config = SweepJobConfig::default().with_timeout(90);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: SweepJobConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.interval_secs, config.interval_secs);
        assert_eq!(decoded.timeout_secs, 90);
    }

    #[tokio::test]
    async fn test_run_sweep_job_reports_counters() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        storage.put_user(&AutomationUser::new("automation")).unwrap();
        let facet = Facet::new(Uuid::new_v4(), "Malware");
        storage.put_facet(&facet).unwrap();
        for label in ["Emotet", "TrickBot"] {
            storage.put_tag(&Tag::new(Uuid::new_v4(), label, facet.facet_id)).unwrap();
        }

        let output = run_sweep_job(&sweeper(storage)).await.unwrap();

        assert_eq!(output.metadata.get("stale").map(String::as_str), Some("2"));
        assert_eq!(output.metadata.get("processed").map(String::as_str), Some("2"));
        assert_eq!(output.metadata.get("errors").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn test_run_sweep_job_fails_without_user() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());

        let err = run_sweep_job(&sweeper(storage)).await.unwrap_err();
        assert!(err.starts_with("Sweep failed"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_sweep_job_registers_once() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let scheduler = SchedulerService::new(Default::default()).await.unwrap();
        let sweeper = sweeper(storage);

        create_sweep_job(&scheduler, sweeper.clone(), SweepJobConfig::default())
            .await
            .unwrap();
        let status = scheduler.registry().get_status(SWEEP_JOB_NAME).unwrap();
        assert_eq!(status.schedule, "every 300s");

        let again = create_sweep_job(&scheduler, sweeper, SweepJobConfig::default()).await;
        assert!(matches!(again, Err(SchedulerError::DuplicateJob(_))));
    }
}
