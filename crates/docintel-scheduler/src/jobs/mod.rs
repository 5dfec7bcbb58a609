//! Predefined job implementations.
//!
//! # Available Jobs
//!
//! - **sweep**: periodic reconciliation of stale tags into the search index

#[cfg(feature = "jobs")]
pub mod sweep;

#[cfg(feature = "jobs")]
pub use sweep::{create_sweep_job, SweepJobConfig, SWEEP_JOB_NAME};
