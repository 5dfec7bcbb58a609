//! Background job scheduler for the DocIntel indexer daemon.
//!
//! This crate runs interval jobs on top of `tokio-cron-scheduler` with
//! graceful shutdown.
//!
//! # Features
//!
//! - Fixed-interval scheduling
//! - Single-flight runs: a tick is skipped while the previous run is active
//! - Optional per-run timeout
//! - Shutdown that waits for in-flight runs, bounded by a timeout
//! - Job status observability via `JobRegistry`
//!
//! # Example
//!
//! ```ignore
//! use docintel_scheduler::{JobOptions, JobOutput, SchedulerConfig, SchedulerService};
//!
//! let mut scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//!
//! scheduler.register_interval_job(
//!     "reconciliation_sweep",
//!     JobOptions::every(Duration::from_secs(300)).with_skip_event("sweep_skipped"),
//!     |_token| async { Ok(JobOutput::new()) },
//! ).await?;
//!
//! scheduler.start().await?;
//! // ...
//! scheduler.shutdown().await?;
//! ```

mod config;
mod error;
mod overlap;
mod registry;
mod scheduler;

pub mod jobs;

pub use config::{JobOptions, SchedulerConfig};
pub use error::SchedulerError;
pub use overlap::{OverlapGuard, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::SchedulerService;

#[cfg(feature = "jobs")]
pub use jobs::{create_sweep_job, SweepJobConfig, SWEEP_JOB_NAME};
