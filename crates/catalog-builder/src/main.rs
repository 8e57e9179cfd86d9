//! Catalog builder CLI application.

use anyhow::{Context, Result};
use catalog_builder::{CacheLayer, JikanClient, Orchestrator, RefreshMode};
use chrono::Duration;
use clap::Parser;
use shared::{Catalog, Config, DataPaths, Difficulty, LogConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Clear cache before running
    #[arg(long)]
    clear_cache: bool,

    /// Ignore cached responses for this run
    #[arg(long)]
    force_refresh: bool,

    /// Keep the published catalog and only enrich new anime
    #[arg(long)]
    incremental: bool,

    /// Exit without crawling when the catalog is still fresh
    #[arg(long)]
    if_stale: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let mut log_config = LogConfig::from_config(&config, "catalog-builder");
    if args.verbose {
        log_config = log_config.with_level(tracing::Level::DEBUG);
    }
    shared::logging::init(log_config)?;

    info!("Catalog builder starting");
    info!(config_file = %args.config.display(), "Loaded configuration");

    // Initialize data paths
    let data_paths = DataPaths::new(config.data_dir());
    data_paths
        .create_dirs()
        .context("Failed to create data directories")?;

    let stale_after = Duration::days(config.catalog.stale_after_days);

    if args.if_stale {
        let catalog = Catalog::new(data_paths.clone(), stale_after);
        if !catalog.needs_update() {
            info!("Catalog is fresh, nothing to do");
            return Ok(());
        }
        info!("Catalog is stale, refreshing");
    }

    // Initialize cache
    let cache = CacheLayer::new(
        config.cache_dir(),
        config.jikan.cache.enabled,
        Duration::hours(config.jikan.cache.ttl_hours),
    )
    .context("Failed to initialize cache")?
    .with_force_refresh(args.force_refresh);

    if args.clear_cache {
        info!("Clearing cache");
        cache.clear().context("Failed to clear cache")?;
    }

    // Display cache statistics
    let cache_stats = cache.stats().context("Failed to get cache stats")?;
    info!(
        cached_files = cache_stats.total_files,
        cache_size_mb = cache_stats.total_size_bytes / 1_000_000,
        "Cache statistics"
    );

    // Initialize API client and orchestrator
    let client = JikanClient::from_config(&config.jikan, cache);
    let mode = if args.incremental {
        RefreshMode::Incremental
    } else {
        RefreshMode::Full
    };
    let mut orchestrator = Orchestrator::new(client, data_paths.clone(), &config).with_mode(mode);

    // Run pipeline
    info!("Starting catalog refresh");
    let stats = orchestrator.run().await.context("Catalog refresh failed")?;

    // Display final statistics
    info!("=== Refresh Complete ===");
    info!("Candidates: {}", stats.candidates);
    info!("Already processed: {}", stats.skipped);
    info!("Anime enriched: {}", stats.enriched);
    info!("Characters added: {}", stats.characters_added);
    info!("Openings added: {}", stats.openings_added);
    info!("Batches flushed: {}", stats.batches_flushed);
    info!("Records dropped: {}", stats.records_dropped);
    info!("Errors: {}", stats.errors);

    // Display published catalog statistics
    let mut catalog = Catalog::new(data_paths, stale_after);
    if catalog.ensure_initialized() {
        info!("=== Catalog Statistics ===");
        for tier in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            let characters = catalog.characters().iter().filter(|c| c.difficulty == tier).count();
            let openings = catalog.openings().iter().filter(|o| o.difficulty == tier).count();
            info!("{}: {} characters, {} openings", tier, characters, openings);
        }
    }

    info!("Catalog builder finished successfully");

    Ok(())
}
