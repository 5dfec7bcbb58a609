//! Job registry for tracking job metadata and execution status.
//!
//! The `JobRegistry` is shared between the scheduler and whoever wants to
//! report on jobs (the `stats` command, tests). It records last/next run
//! times, durations, results and counters.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    /// Job completed successfully
    Success,
    /// Job failed with an error message
    Failed(String),
    /// Job was skipped (previous run still active)
    Skipped(String),
}

/// Extended job output with optional metadata.
///
/// Jobs use this to report counters of the run back to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    /// Arbitrary key-value metadata from the job run.
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    /// Human-readable schedule, e.g. "every 300s"
    pub schedule: String,
    /// When the job last started (if ever)
    pub last_run: Option<DateTime<Utc>>,
    /// Duration of the last run in milliseconds
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    /// When the job is next expected to run
    pub next_run: Option<DateTime<Utc>>,
    /// Total number of ticks, including skipped ones
    pub run_count: u64,
    /// Total number of failed runs
    pub error_count: u64,
    /// Total number of ticks skipped because of overlap
    pub skip_count: u64,
    pub is_running: bool,
    /// Metadata reported by the last completed run
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: String, schedule: String) -> Self {
        Self {
            job_name,
            schedule,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            next_run: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Registry for tracking job metadata and execution status.
///
/// # Example
///
/// ```
/// use docintel_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("reconciliation_sweep", "every 300s");
///
/// registry.record_start("reconciliation_sweep");
/// assert!(registry.is_running("reconciliation_sweep"));
///
/// registry.record_complete("reconciliation_sweep", JobResult::Success, 1500);
/// assert!(!registry.is_running("reconciliation_sweep"));
/// ```
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    // Status bookkeeping stays usable after a panicking writer.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new job. Replaces an existing entry with the same name.
    pub fn register(&self, job_name: &str, schedule: &str) {
        self.write().insert(
            job_name.to_string(),
            JobStatus::new(job_name.to_string(), schedule.to_string()),
        );
    }

    /// Record that a job has started executing.
    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = true;
            status.last_run = Some(Utc::now());
        }
    }

    /// Record that a job has completed.
    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, HashMap::new());
    }

    /// Record that a job has completed, with the metadata it reported.
    ///
    /// A skipped tick does not touch the running flag or the last run
    /// details, since the previous run is still going.
    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        let mut jobs = self.write();
        let Some(status) = jobs.get_mut(job_name) else {
            return;
        };

        status.run_count += 1;
        match result {
            JobResult::Skipped(_) => {
                status.skip_count += 1;
            }
            JobResult::Failed(_) => {
                status.error_count += 1;
                status.is_running = false;
                status.last_duration_ms = Some(duration_ms);
                status.last_run_metadata = metadata;
            }
            JobResult::Success => {
                status.is_running = false;
                status.last_duration_ms = Some(duration_ms);
                status.last_run_metadata = metadata;
            }
        }
        status.last_result = Some(result);
    }

    /// Update the next expected run time for a job.
    pub fn set_next_run(&self, job_name: &str, next: DateTime<Utc>) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.next_run = Some(next);
        }
    }

    /// Get the status of a specific job.
    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// Get the status of all registered jobs, sorted by name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    /// Check if a job is currently running. `false` for unknown jobs.
    pub fn is_running(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_register_and_get() {
        let registry = JobRegistry::new();
        registry.register("sweep", "every 300s");

        let status = registry.get_status("sweep").unwrap();
        assert_eq!(status.job_name, "sweep");
        assert_eq!(status.schedule, "every 300s");
        assert_eq!(status.run_count, 0);
        assert!(!status.is_running);
    }

    #[test]
    fn test_registry_record_start() {
        let registry = JobRegistry::new();
        registry.register("sweep", "every 300s");

        assert!(!registry.is_running("sweep"));
        registry.record_start("sweep");
        assert!(registry.is_running("sweep"));
        assert!(registry.get_status("sweep").unwrap().last_run.is_some());
    }

    #[test]
    fn test_registry_record_complete_success() {
        let registry = JobRegistry::new();
        registry.register("sweep", "every 300s");
        registry.record_start("sweep");

        let output = JobOutput::new().with_metadata("processed", 12);
        registry.record_complete_with_metadata("sweep", JobResult::Success, 1500, output.metadata);

        let status = registry.get_status("sweep").unwrap();
        assert!(!status.is_running);
        assert_eq!(status.last_duration_ms, Some(1500));
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 0);
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(status.last_run_metadata.get("processed").map(String::as_str), Some("12"));
    }

    #[test]
    fn test_registry_record_complete_failure() {
        let registry = JobRegistry::new();
        registry.register("sweep", "every 300s");
        registry.record_start("sweep");

        registry.record_complete("sweep", JobResult::Failed("timeout".into()), 5000);

        let status = registry.get_status("sweep").unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 1);
        assert!(!status.is_running);
        assert_eq!(status.last_result, Some(JobResult::Failed("timeout".into())));
    }

    #[test]
    fn test_skipped_tick_keeps_running_state() {
        let registry = JobRegistry::new();
        registry.register("sweep", "every 300s");
        registry.record_start("sweep");

        registry.record_complete("sweep", JobResult::Skipped("overlap".into()), 0);

        let status = registry.get_status("sweep").unwrap();
        assert!(status.is_running);
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.error_count, 0);
        assert!(status.last_duration_ms.is_none());
    }

    #[test]
    fn test_registry_set_next_run() {
        let registry = JobRegistry::new();
        registry.register("sweep", "every 300s");

        let next = Utc::now();
        registry.set_next_run("sweep", next);
        assert_eq!(registry.get_status("sweep").unwrap().next_run, Some(next));
    }

    #[test]
    fn test_registry_unknown_job() {
        let registry = JobRegistry::new();

        assert!(registry.get_status("unknown").is_none());
        assert!(!registry.is_running("unknown"));
        assert!(!registry.is_registered("unknown"));

        registry.record_start("unknown");
        registry.record_complete("unknown", JobResult::Success, 100);
        assert_eq!(registry.job_count(), 0);
    }

    #[test]
    fn test_get_all_status_sorted() {
        let registry = JobRegistry::new();
        registry.register("b", "every 60s");
        registry.register("a", "every 60s");

        let names: Vec<_> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_registry_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(JobRegistry::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let name = format!("job-{}", i);
                    registry.register(&name, "every 60s");
                    registry.record_start(&name);
                    registry.record_complete(&name, JobResult::Success, 100);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.job_count(), 10);
    }
}
