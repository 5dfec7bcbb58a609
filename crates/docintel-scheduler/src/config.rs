//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long shutdown waits for in-flight job runs to finish.
    /// Defaults to 30 seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Per-job scheduling options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    /// Time between two runs.
    pub interval: Duration,
    /// Upper bound for one run; `None` lets a run take as long as it needs.
    pub timeout: Option<Duration>,
    /// `log_event` value attached to the warning emitted when a tick is
    /// skipped because the previous run is still active.
    pub skip_event: &'static str,
}

impl JobOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            skip_event: "job_skipped",
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_skip_event(mut self, skip_event: &'static str) -> Self {
        self.skip_event = skip_event;
        self
    }

    /// Human-readable schedule, shown in job status.
    pub fn describe(&self) -> String {
        format!("every {}s", self.interval.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_field_uses_default() {
        let parsed: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_job_options_builder() {
        let options = JobOptions::every(Duration::from_secs(300))
            .with_timeout(Duration::from_secs(60))
            .with_skip_event("sweep_skipped");

        assert_eq!(options.timeout, Some(Duration::from_secs(60)));
        assert_eq!(options.skip_event, "sweep_skipped");
        assert_eq!(options.describe(), "every 300s");
        assert!(JobOptions::every(Duration::from_secs(1)).timeout.is_none());
    }
}
