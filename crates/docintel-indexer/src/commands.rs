//! Command implementations for the indexer daemon.
//!
//! Handles:
//! - start: Load config, open storage and index, run consumer and sweep job
//! - sweep: One reconciliation sweep
//! - rebuild: Full re-index from the entity store
//! - stats: Entity and index counts
//! - search: Keyword search over the tag index

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use docintel_bus::NatsEventSource;
use docintel_indexing::{
    AutomationContextFactory, ConsumerRunner, ContextFactory, IndexRebuilder, IndexingConsumer,
    LoggingProgressCallback, RebuildConfig, ReconciliationSweeper, TantivyFacetIndexingUtility,
    TantivyTagIndexingUtility,
};
use docintel_scheduler::{create_sweep_job, SchedulerConfig, SchedulerService, SweepJobConfig};
use docintel_search::{Collection, IndexSearcher, SearchIndex, SearchIndexConfig, SearchIndexer};
use docintel_storage::Storage;
use docintel_types::{Settings, StalenessPolicy};

/// Storage, index and the indexing building blocks wired from settings.
struct Components {
    factory: Arc<AutomationContextFactory>,
    tags: Arc<TantivyTagIndexingUtility>,
    facets: Arc<TantivyFacetIndexingUtility>,
}

fn load_settings(config_path: Option<&str>, log_level_override: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the fmt subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    info!("Opening storage at {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let storage = Storage::open(&db_path)
        .with_context(|| format!("Failed to open storage at {:?} (is another indexer running?)", db_path))?;
    Ok(Arc::new(storage))
}

fn open_index(settings: &Settings) -> Result<SearchIndex> {
    let index_path = settings.expanded_search_index_path();
    info!("Opening search index at {:?}", index_path);

    fs::create_dir_all(&index_path).context("Failed to create search index directory")?;
    SearchIndex::open_or_create(SearchIndexConfig::new(index_path)).context("Failed to open search index")
}

fn build_components(settings: &Settings, storage: Arc<Storage>, index: &SearchIndex) -> Result<Components> {
    let timeout = settings.operation_timeout();
    let indexer = Arc::new(
        SearchIndexer::new(index).context("Failed to open index writer (is another indexer running?)")?,
    );

    Ok(Components {
        factory: Arc::new(
            AutomationContextFactory::new(storage, settings.automation_user.clone(), timeout)
                .with_scan_timeout(settings.scan_timeout()),
        ),
        tags: Arc::new(TantivyTagIndexingUtility::new(indexer.clone(), timeout)),
        facets: Arc::new(TantivyFacetIndexingUtility::new(indexer, timeout)),
    })
}

/// Fail fast when the automation account is missing or disabled.
async fn check_automation_user(factory: &AutomationContextFactory, username: &str) -> Result<()> {
    factory
        .new_scope()
        .await
        .with_context(|| format!("Automation user '{}' cannot open an indexing context", username))?;
    Ok(())
}

fn sweeper(settings: &Settings, components: &Components) -> ReconciliationSweeper {
    ReconciliationSweeper::new(
        components.factory.clone(),
        components.tags.clone(),
        StalenessPolicy::from_minutes(settings.max_indexing_delay),
        settings.sweep_commit_interval,
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Start the indexer daemon.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Open RocksDB storage and the Tantivy index
/// 3. Register and start the reconciliation sweep job
/// 4. Consume change events until SIGINT/SIGTERM
/// 5. Drain in-flight events, then wait for a running sweep
pub async fn start_daemon(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level_override)?;
    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    init_logging(&settings)?;

    info!("DocIntel indexer starting...");
    info!("Configuration:");
    info!("  Database path: {}", settings.db_path);
    info!("  Search index path: {}", settings.search_index_path);
    info!("  Automation user: {}", settings.automation_user);
    info!("  Message bus: {} ({})", settings.nats.url, settings.nats.subject);
    info!(
        "  Sweep: every {} min, max delay {} min",
        settings.indexing_frequency_check, settings.max_indexing_delay
    );

    let storage = open_storage(&settings)?;
    let index = open_index(&settings)?;
    let components = build_components(&settings, storage, &index)?;
    check_automation_user(&components.factory, &settings.automation_user).await?;

    let mut scheduler = SchedulerService::new(
        SchedulerConfig::default().with_shutdown_timeout(settings.shutdown_timeout_secs),
    )
    .await
    .context("Failed to create scheduler")?;
    create_sweep_job(
        &scheduler,
        Arc::new(sweeper(&settings, &components)),
        SweepJobConfig::default().with_interval(settings.sweep_interval()),
    )
    .await
    .context("Failed to register sweep job")?;

    let source = NatsEventSource::connect(&settings.nats)
        .await
        .context("Failed to connect to message bus")?;

    scheduler.start().await.context("Failed to start scheduler")?;

    let consumer = Arc::new(IndexingConsumer::new(
        components.factory.clone(),
        components.tags.clone(),
        components.facets.clone(),
    ));
    let runner = ConsumerRunner::new(consumer, settings.max_concurrent_messages);
    let cancel = CancellationToken::new();
    let runner_cancel = cancel.clone();
    let mut consumer_task = tokio::spawn(async move { runner.run(source, runner_cancel).await });

    let joined = tokio::select! {
        _ = shutdown_signal() => {
            cancel.cancel();
            consumer_task.await
        }
        joined = &mut consumer_task => {
            warn!("Consumer stopped before shutdown was requested");
            joined
        }
    };

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler shutdown failed");
    }

    let stats = joined
        .context("Consumer task panicked")?
        .context("Consumer loop failed")?;
    info!(
        received = stats.received,
        malformed = stats.malformed,
        processed = stats.result.processed,
        skipped = stats.result.skipped,
        errors = stats.result.errors,
        "DocIntel indexer stopped"
    );

    Ok(())
}

/// Run one reconciliation sweep.
pub async fn run_sweep(config_path: Option<&str>, log_level_override: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, log_level_override)?;
    init_logging(&settings)?;

    let storage = open_storage(&settings)?;
    let index = open_index(&settings)?;
    let components = build_components(&settings, storage, &index)?;

    let sweep = sweeper(&settings, &components)
        .run_once()
        .await
        .context("Sweep failed")?;

    println!("Sweep complete in {} ms", sweep.duration.as_millis());
    println!("  Stale tags:  {}", sweep.stale);
    println!("  Re-indexed:  {}", sweep.result.processed);
    println!("  Skipped:     {}", sweep.result.skipped);
    println!("  Errors:      {}", sweep.result.errors);
    Ok(())
}

/// Re-index every facet and tag.
pub async fn run_rebuild(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    clear_first: bool,
    batch_size: usize,
) -> Result<()> {
    let settings = load_settings(config_path, log_level_override)?;
    init_logging(&settings)?;

    let storage = open_storage(&settings)?;
    let index = open_index(&settings)?;
    let components = build_components(&settings, storage, &index)?;

    let rebuilder = IndexRebuilder::new(
        components.factory.clone(),
        components.tags.clone(),
        components.facets.clone(),
        RebuildConfig::default()
            .with_batch_size(batch_size)
            .with_clear_first(clear_first),
    );
    let result = rebuilder
        .rebuild(&LoggingProgressCallback)
        .await
        .context("Rebuild failed")?;

    println!("Rebuild complete in {} ms", result.elapsed_ms);
    println!("  Facets indexed: {}", result.progress.facets_indexed);
    println!("  Tags indexed:   {}", result.progress.tags_indexed);
    println!("  Skipped:        {}", result.progress.skipped);
    println!("  Errors:         {}", result.progress.errors);
    Ok(())
}

/// Show entity store and index counts.
pub fn show_stats(config_path: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, None)?;

    let storage = open_storage(&settings)?;
    let stats = storage.get_stats().context("Failed to read storage stats")?;
    let policy = StalenessPolicy::from_minutes(settings.max_indexing_delay);
    let stale = storage
        .find_stale_tags(&policy)
        .context("Failed to scan for stale tags")?;

    let index = open_index(&settings)?;
    let searcher = IndexSearcher::new(&index).context("Failed to open index reader")?;
    let indexed_tags = searcher.count(Collection::Tag).context("Failed to count tags")?;
    let indexed_facets = searcher
        .count(Collection::Facet)
        .context("Failed to count facets")?;

    println!("Entity store ({}):", settings.db_path);
    println!("  Tags:            {}", stats.tag_count);
    println!("  Facets:          {}", stats.facet_count);
    println!("  Document links:  {}", stats.association_count);
    println!("  Stale tags:      {} (max delay {} min)", stale.len(), settings.max_indexing_delay);
    println!("  Disk usage:      {} bytes", stats.disk_usage_bytes);
    println!("Search index ({}):", settings.search_index_path);
    println!("  Tag documents:   {}", indexed_tags);
    println!("  Facet documents: {}", indexed_facets);
    Ok(())
}

/// Keyword search over the tag index.
pub fn run_search(config_path: Option<&str>, query: &str, limit: usize) -> Result<()> {
    let settings = load_settings(config_path, None)?;
    let index = open_index(&settings)?;
    let searcher = IndexSearcher::new(&index).context("Failed to open index reader")?;

    let hits = searcher.search_tags(query, limit).context("Search failed")?;
    if hits.is_empty() {
        println!("No tags found for \"{}\"", query);
        return Ok(());
    }

    for hit in hits {
        println!(
            "{:>6.2}  {}  {}",
            hit.score, hit.tag.tag_id, hit.tag.friendly_name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    use docintel_types::{Facet, Tag};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn write_config(dir: &Path) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "db_path = \"{}\"\nsearch_index_path = \"{}\"",
            dir.join("db").display(),
            dir.join("search-index").display()
        )
        .unwrap();
        file
    }

    #[test]
    fn test_load_settings_applies_log_level_override() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());

        let settings = load_settings(config.path().to_str(), Some("debug")).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert!(settings.db_path.ends_with("db"));
    }

    #[test]
    fn test_load_settings_missing_file_fails() {
        let result = load_settings(Some("/nonexistent/docintel/indexer.toml"), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_stats_and_search_on_fresh_workspace() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let path = config.path().to_str();

        {
            let settings = load_settings(path, None).unwrap();
            let storage = open_storage(&settings).unwrap();
            let facet = Facet::new(Uuid::new_v4(), "Malware");
            storage.put_facet(&facet).unwrap();
            storage.put_tag(&Tag::new(Uuid::new_v4(), "Emotet", facet.facet_id)).unwrap();
        }

        show_stats(path).unwrap();
        run_search(path, "emotet", 5).unwrap();
    }

    #[tokio::test]
    async fn test_missing_automation_user_fails_fast() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let settings = load_settings(config.path().to_str(), None).unwrap();

        let storage = open_storage(&settings).unwrap();
        let index = open_index(&settings).unwrap();
        let components = build_components(&settings, storage, &index).unwrap();

        let err = check_automation_user(&components.factory, &settings.automation_user)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("automation"));
    }
}
