//! # Search Cache Daemon
//!
//! Opens the cache service, runs the periodic maintenance loop and shuts down
//! cleanly on SIGINT or SIGTERM.
//!
//! Configuration is read from the file named by `SEARCH_CACHE_CONFIG`
//! (YAML, or JSON when the extension is `.json`), defaulting to
//! `config/search-cache.yaml`. A missing file means built-in defaults.
//! `SEARCH_CACHE_*` environment variables override either source.

use search_cache::caching::CacheService;
use search_cache::core::config::CacheConfig;
use search_cache::core::error::CacheResult;
use search_cache::observability::{describe_metrics, init_logging};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "config/search-cache.yaml";

#[tokio::main]
async fn main() -> CacheResult<()> {
    let config = match load_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);
    describe_metrics();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting search cache");

    let service = match CacheService::open(config).await {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(error = %e, "Failed to open search cache");
            std::process::exit(1);
        }
    };

    let health = service.health_check().await;
    if !health.is_healthy() {
        warn!(?health, "Search cache started degraded");
    }

    let maintenance = service.start_maintenance();

    wait_for_shutdown().await?;

    if let Some(report) = maintenance.stop().await {
        info!(
            ran_at = %report.ran_at,
            purged = report.purged_entries,
            "Last maintenance pass"
        );
    }

    let report = service.close();
    info!(
        hit_rate = report.hit_rate,
        total_requests = report.total_requests,
        entry_count = report.entry_count,
        recommendations = ?report.recommendations,
        "Search cache shutdown complete"
    );
    Ok(())
}

async fn load_config() -> CacheResult<CacheConfig> {
    let path = std::env::var("SEARCH_CACHE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    if path.ends_with(".json") && Path::new(&path).exists() {
        return CacheConfig::load_from_json(&path).await;
    }
    if Path::new(&path).exists() {
        return CacheConfig::load_from_file(&path).await;
    }

    let mut config = CacheConfig::default();
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

async fn wait_for_shutdown() -> CacheResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}
