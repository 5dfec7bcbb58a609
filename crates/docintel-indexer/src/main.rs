//! DocIntel Indexer Daemon
//!
//! Keeps the tag/facet search index in step with the entity store.
//!
//! # Usage
//!
//! ```bash
//! docintel-indexer start [--db-path PATH]
//! docintel-indexer sweep
//! docintel-indexer rebuild [--keep-existing]
//! docintel-indexer stats
//! docintel-indexer search <QUERY> [--limit N]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/docintel/indexer.toml)
//! 3. Environment variables (DOCINTEL_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use docintel_indexer::{
    run_rebuild, run_search, run_sweep, show_stats, start_daemon, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Start { db_path } => {
            start_daemon(config, db_path.as_deref(), log_level).await?;
        }
        Commands::Sweep => {
            run_sweep(config, log_level).await?;
        }
        Commands::Rebuild {
            keep_existing,
            batch_size,
        } => {
            run_rebuild(config, log_level, !keep_existing, batch_size).await?;
        }
        Commands::Stats => {
            show_stats(config)?;
        }
        Commands::Search { query, limit } => {
            run_search(config, &query, limit)?;
        }
    }

    Ok(())
}
