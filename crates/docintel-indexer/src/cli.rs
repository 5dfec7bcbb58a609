//! CLI argument parsing for the indexer daemon.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

/// DocIntel Indexer
///
/// Keeps the tag/facet search index consistent with the entity store.
#[derive(Parser, Debug)]
#[command(name = "docintel-indexer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/docintel/indexer.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the message consumer and the periodic reconciliation sweep
    Start {
        /// Override database path
        #[arg(long)]
        db_path: Option<String>,
    },

    /// Run one reconciliation sweep and exit
    Sweep,

    /// Re-index every facet and tag from the entity store
    Rebuild {
        /// Keep existing documents instead of clearing the index first
        #[arg(long)]
        keep_existing: bool,

        /// Documents written between two commits
        #[arg(long, default_value = "100")]
        batch_size: usize,
    },

    /// Show entity and index counts
    Stats,

    /// Keyword search over the tag index
    Search {
        /// Query string
        query: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}
