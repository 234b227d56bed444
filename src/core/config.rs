//! # Configuration Module
//!
//! Typed configuration for the search cache with validated defaults.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Environment variable override support (`SEARCH_CACHE_*`)
//! - Validation that reports every problem at once

use crate::caching::strategies::{default_query_rules, QueryRule};
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{MAX_TTL_SECONDS, MIN_TTL_SECONDS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main cache configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when false every operation is a no-op
    pub enabled: bool,

    /// Remote tier endpoint (`redis://host:port`); `None` runs local-only
    pub remote_endpoint: Option<String>,

    /// Maximum number of entries in the local tier
    pub local_capacity: usize,

    /// Base TTL used by the adaptive strategy
    pub default_ttl_seconds: u64,

    /// Byte budget for the local tier, in megabytes
    pub max_cache_size_mb: u64,

    pub warming_enabled: bool,

    pub analytics_enabled: bool,

    /// Gzip payloads before they are written to the remote tier
    pub compression_enabled: bool,

    /// Prefix applied to every derived key
    pub key_prefix: String,

    /// Deadline for every remote tier call
    #[serde(with = "humantime_serde")]
    pub remote_timeout: Duration,

    /// TTL given to entries promoted from the remote tier into the local tier
    pub promotion_ttl_seconds: u64,

    pub strategy: StrategyConfig,

    pub warming: WarmingConfig,

    pub maintenance: MaintenanceConfig,

    pub logging: LoggingConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote_endpoint: None,
            local_capacity: 1000,
            default_ttl_seconds: 3600,
            max_cache_size_mb: 100,
            warming_enabled: true,
            analytics_enabled: true,
            compression_enabled: false,
            key_prefix: "search:".to_string(),
            remote_timeout: Duration::from_millis(500),
            promotion_ttl_seconds: 300,
            strategy: StrategyConfig::default(),
            warming: WarmingConfig::default(),
            maintenance: MaintenanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which admission strategy the service consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Adaptive,
    QueryBased,
    ResultBased,
    Hybrid,
}

/// When the adaptive frequency score reads the recency of a query.
///
/// `AfterUpdate` refreshes `last_seen` before computing the recency weight,
/// which pins the weight near 1.0 for the current observation.
/// `BeforeUpdate` measures age against the previous observation instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyMode {
    AfterUpdate,
    BeforeUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,

    pub recency_mode: RecencyMode,

    /// Ordered keyword rules; the first matching rule wins
    pub query_rules: Vec<QueryRule>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::Hybrid,
            recency_mode: RecencyMode::AfterUpdate,
            query_rules: default_query_rules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmingConfig {
    /// How many of the most frequent queries are considered
    pub top_n: usize,

    /// Minimum number of log occurrences for a query to be warmed
    pub min_frequency: usize,

    /// Normalized queries shorter than this are ignored
    pub min_query_length: usize,

    /// Maximum number of warm-up computations in flight
    pub concurrency: usize,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            top_n: 50,
            min_frequency: 5,
            min_query_length: 3,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Rolling statistics are reset once this much time has passed since the last reset
    #[serde(with = "humantime_serde")]
    pub stats_reset_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            stats_reset_interval: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: CacheConfig = serde_yaml::from_str(&content)
            .map_err(|e| CacheError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: CacheConfig = serde_json::from_str(&content)
            .map_err(|e| CacheError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern `SEARCH_CACHE_<FIELD>`,
    /// for example `SEARCH_CACHE_LOCAL_CAPACITY=5000`.
    pub fn apply_env_overrides(&mut self) -> CacheResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> CacheResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SEARCH_CACHE_ENABLED") {
            self.enabled = parse_bool("SEARCH_CACHE_ENABLED", &value)?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_REMOTE_ENDPOINT") {
            self.remote_endpoint = if value.trim().is_empty() { None } else { Some(value) };
        }

        if let Some(value) = lookup("SEARCH_CACHE_LOCAL_CAPACITY") {
            self.local_capacity = value
                .parse()
                .map_err(|e| CacheError::config(format!("Invalid SEARCH_CACHE_LOCAL_CAPACITY: {}", e)))?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_DEFAULT_TTL_SECONDS") {
            self.default_ttl_seconds = value
                .parse()
                .map_err(|e| CacheError::config(format!("Invalid SEARCH_CACHE_DEFAULT_TTL_SECONDS: {}", e)))?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_MAX_SIZE_MB") {
            self.max_cache_size_mb = value
                .parse()
                .map_err(|e| CacheError::config(format!("Invalid SEARCH_CACHE_MAX_SIZE_MB: {}", e)))?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_WARMING_ENABLED") {
            self.warming_enabled = parse_bool("SEARCH_CACHE_WARMING_ENABLED", &value)?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_ANALYTICS_ENABLED") {
            self.analytics_enabled = parse_bool("SEARCH_CACHE_ANALYTICS_ENABLED", &value)?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_COMPRESSION_ENABLED") {
            self.compression_enabled = parse_bool("SEARCH_CACHE_COMPRESSION_ENABLED", &value)?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_REMOTE_TIMEOUT") {
            self.remote_timeout = humantime::parse_duration(&value)
                .map_err(|e| CacheError::config(format!("Invalid SEARCH_CACHE_REMOTE_TIMEOUT: {}", e)))?;
        }

        if let Some(value) = lookup("SEARCH_CACHE_LOG_LEVEL") {
            self.logging.level = value;
        }

        Ok(())
    }

    /// Validate the configuration, collecting every error
    pub fn validate(&self) -> CacheResult<()> {
        let mut errors = Vec::new();

        if self.local_capacity == 0 {
            errors.push("local_capacity must be greater than 0".to_string());
        }

        if self.max_cache_size_mb == 0 {
            errors.push("max_cache_size_mb must be greater than 0".to_string());
        }

        if !(MIN_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&self.default_ttl_seconds) {
            errors.push(format!(
                "default_ttl_seconds must be between {} and {}, got: {}",
                MIN_TTL_SECONDS, MAX_TTL_SECONDS, self.default_ttl_seconds
            ));
        }

        if self.promotion_ttl_seconds == 0 {
            errors.push("promotion_ttl_seconds must be greater than 0".to_string());
        }

        if self.remote_timeout.is_zero() {
            errors.push("remote_timeout must be greater than 0".to_string());
        }

        if let Some(endpoint) = &self.remote_endpoint {
            match Url::parse(endpoint) {
                Ok(url) if matches!(url.scheme(), "redis" | "rediss") => {}
                Ok(url) => errors.push(format!(
                    "remote_endpoint must use redis:// or rediss://, got: {}",
                    url.scheme()
                )),
                Err(e) => errors.push(format!("Invalid remote_endpoint '{}': {}", endpoint, e)),
            }
        }

        if self.warming.top_n == 0 {
            errors.push("warming.top_n must be greater than 0".to_string());
        }

        if self.warming.concurrency == 0 {
            errors.push("warming.concurrency must be greater than 0".to_string());
        }

        if self.maintenance.interval.is_zero() {
            errors.push("maintenance.interval must be greater than 0".to_string());
        }

        for (index, rule) in self.strategy.query_rules.iter().enumerate() {
            if rule.keywords.is_empty() {
                errors.push(format!("Query rule {} ('{}') has no keywords", index, rule.name));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.logging.level)),
        }

        if !errors.is_empty() {
            return Err(CacheError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// Local tier byte budget
    pub fn max_cache_size_bytes(&self) -> usize {
        (self.max_cache_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

fn parse_bool(name: &str, value: &str) -> CacheResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CacheError::config(format!("Invalid {}: expected a boolean, got '{}'", name, other))),
    }
}
