//! DocIntel indexer daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (start, sweep, rebuild, stats, search)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{run_rebuild, run_search, run_sweep, show_stats, start_daemon};
