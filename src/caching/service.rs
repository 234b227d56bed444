//! # Cache Service
//!
//! The facade callers use. Reads go local tier first, then the remote tier,
//! promoting remote hits into the local tier with a short TTL. Writes consult
//! the admission strategy and go to both tiers; a failing tier is logged and
//! skipped, never surfaced to the caller.

use super::analytics::{Analytics, AnalyticsReport, CacheStats, StatsRecorder};
use super::backend::SearchBackend;
use super::codec::PayloadCodec;
use super::invalidation::{InvalidationOutcome, Invalidator, TagIndex};
use super::key_generator::KeyGenerator;
use super::maintenance::{MaintenanceHandle, MaintenanceLoop};
use super::stores::{LocalCache, LocalCacheStats, RedisStore, RemoteLookup, RemoteStore, RemoteTier};
use super::strategies::{CacheStrategy, StrategyEngine};
use super::warming::{WarmTarget, Warmer, WarmingReport};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::CacheConfig;
use crate::core::error::CacheResult;
use crate::core::types::{clamp_ttl, CacheKey, Record, SearchLogEntry, SearchRequest};
use crate::observability::metrics as names;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`CacheService::health_check`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub enabled: bool,
    pub open: bool,
    pub local_entries: usize,
    /// Name of the remote store, if one is configured
    pub remote_store: Option<String>,
    /// Whether the remote store answered a ping; `None` without a remote tier
    pub remote_reachable: Option<bool>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.open && self.remote_reachable.unwrap_or(true)
    }
}

/// Two-tier cache with strategy-driven admission
pub struct CacheService {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    keys: KeyGenerator,
    local: Arc<LocalCache>,
    remote: Option<Arc<RemoteTier>>,
    engine: StrategyEngine,
    invalidator: Invalidator,
    warmer: Warmer,
    stats: StatsRecorder,
    analytics: Analytics,
    open: AtomicBool,
}

impl CacheService {
    /// Validate `config`, connect the remote tier if one is configured and
    /// return a ready service. An unreachable remote endpoint leaves the
    /// service running local-only.
    pub async fn open(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;

        let remote: Option<Arc<dyn RemoteStore>> = match (&config.remote_endpoint, config.enabled) {
            (Some(endpoint), true) => match RedisStore::connect(endpoint, "").await {
                Ok(store) => Some(Arc::new(store) as Arc<dyn RemoteStore>),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Remote cache unavailable, running local-only");
                    None
                }
            },
            _ => None,
        };

        Self::with_components(config, remote, Arc::new(SystemClock))
    }

    /// Build a service around an explicit remote store and clock
    pub fn with_components(
        config: CacheConfig,
        remote_store: Option<Arc<dyn RemoteStore>>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        config.validate()?;

        let local = Arc::new(LocalCache::new(
            config.local_capacity,
            config.max_cache_size_bytes(),
            clock.clone(),
        ));
        let remote = remote_store.map(|store| {
            Arc::new(RemoteTier::new(
                store,
                PayloadCodec::new(config.compression_enabled),
                config.remote_timeout,
            ))
        });
        let invalidator = Invalidator::new(local.clone(), remote.clone(), Arc::new(TagIndex::new()))
            .with_namespace(config.key_prefix.clone());

        let service = Self {
            keys: KeyGenerator::new(config.key_prefix.clone()),
            engine: StrategyEngine::from_config(&config, clock.clone()),
            warmer: Warmer::new(config.warming.clone()),
            stats: StatsRecorder::new(clock.clone()),
            analytics: Analytics::new(config.max_cache_size_bytes(), config.compression_enabled),
            open: AtomicBool::new(true),
            local,
            remote,
            invalidator,
            clock,
            config,
        };

        info!(
            enabled = service.config.enabled,
            strategy = service.engine.strategy_name(),
            remote = service.remote.as_ref().map(|r| r.store_name()).unwrap_or("none"),
            local_capacity = service.config.local_capacity,
            "Search cache opened"
        );
        Ok(service)
    }

    /// Replace the admission strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn CacheStrategy>) -> Self {
        self.engine = StrategyEngine::new(strategy);
        self
    }

    fn active(&self) -> bool {
        self.config.enabled && self.open.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }

    pub fn strategy_name(&self) -> &'static str {
        self.engine.strategy_name()
    }

    /// Key a request is stored under
    pub fn key_for(&self, request: &SearchRequest) -> CacheKey {
        self.keys.derive(request)
    }

    /// Look up cached results for a request
    pub async fn get(&self, request: &SearchRequest) -> Option<Vec<Record>> {
        if !self.active() {
            return None;
        }

        let key = self.keys.derive(request);
        if let Some(records) = self.local.get(&key) {
            self.stats.record_hit();
            metrics::counter!(names::HITS_TOTAL, "tier" => "local").increment(1);
            debug!(key = %key, tier = "local", "Cache hit");
            return Some(records);
        }

        let Some(remote) = &self.remote else {
            self.record_miss(&key);
            return None;
        };

        match remote.get(&key).await {
            RemoteLookup::Hit(records) => {
                self.stats.record_hit();
                metrics::counter!(names::HITS_TOTAL, "tier" => "remote").increment(1);
                self.promote(key, &records);
                Some(records)
            }
            RemoteLookup::Miss => {
                self.record_miss(&key);
                None
            }
            RemoteLookup::Unavailable(_) => {
                self.stats.record_remote_error();
                self.record_miss(&key);
                None
            }
        }
    }

    fn record_miss(&self, key: &CacheKey) {
        self.stats.record_miss();
        metrics::counter!(names::MISSES_TOTAL).increment(1);
        debug!(key = %key, "Cache miss");
    }

    fn promote(&self, key: CacheKey, records: &[Record]) {
        let ttl = self.config.promotion_ttl_seconds;
        match self.local.set(key.clone(), records.to_vec(), ttl) {
            Ok(evicted) => {
                self.stats.record_evictions(evicted);
                debug!(key = %key, ttl, "Promoted remote hit into local tier");
            }
            Err(e) => debug!(key = %key, error = %e, "Remote hit not promoted"),
        }
    }

    /// Offer results for caching. Returns whether at least one tier stored
    /// them. `ttl_override` replaces the strategy's TTL for admitted results.
    pub async fn set(&self, request: &SearchRequest, results: &[Record], ttl_override: Option<u64>) -> bool {
        if !self.active() {
            return false;
        }

        if results.is_empty() {
            self.stats.record_set(false);
            metrics::counter!(names::SETS_TOTAL, "outcome" => "empty").increment(1);
            debug!(query = %request.query, "Not caching empty result set");
            return false;
        }

        let decision = self.engine.decide(request, results).await;
        if !decision.should_cache {
            self.stats.record_set(false);
            metrics::counter!(names::SETS_TOTAL, "outcome" => "rejected").increment(1);
            debug!(query = %request.query, reason = %decision.reason, "Strategy declined to cache");
            return false;
        }

        let ttl = ttl_override.map(clamp_ttl).unwrap_or(decision.ttl_seconds);
        let key = self.keys.derive(request);
        let mut errors = Vec::new();

        let local_stored = match self.local.set(key.clone(), results.to_vec(), ttl) {
            Ok(evicted) => {
                self.stats.record_evictions(evicted);
                true
            }
            Err(e) => {
                errors.push(format!("local: {}", e));
                false
            }
        };

        let remote_stored = match &self.remote {
            Some(remote) => match remote.set(&key, results, ttl).await {
                Ok(()) => true,
                Err(e) => {
                    self.stats.record_remote_error();
                    errors.push(format!("{}: {}", remote.store_name(), e));
                    false
                }
            },
            None => false,
        };

        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Cache write partially failed");
        }

        let stored = local_stored || remote_stored;
        if stored {
            let expires_at = self.clock.now() + chrono::Duration::seconds(ttl as i64);
            self.invalidator
                .tags()
                .record(&key, TagIndex::tags_for(results, decision.priority), expires_at);
        }

        self.stats.record_set(stored);
        let outcome = if stored { "stored" } else { "failed" };
        metrics::counter!(names::SETS_TOTAL, "outcome" => outcome).increment(1);
        debug!(
            key = %key,
            ttl,
            priority = decision.priority,
            reason = %decision.reason,
            stored,
            "Cache set"
        );
        stored
    }

    /// Run the invalidation action bound to `event_type`
    pub async fn invalidate_by_event(&self, event_type: &str, event_data: &Map<String, Value>) -> InvalidationOutcome {
        if !self.active() {
            return InvalidationOutcome::default();
        }
        self.invalidator.invalidate_by_event(event_type, event_data).await
    }

    /// Drop the entry for one request from both tiers
    pub async fn invalidate_query(&self, request: &SearchRequest) -> InvalidationOutcome {
        if !self.active() {
            return InvalidationOutcome::default();
        }
        let key = self.keys.derive(request);
        self.invalidator.invalidate_keys(&[key]).await
    }

    /// Pre-compute and store the most frequent queries from `logs`
    pub async fn warm_popular_queries(&self, logs: &[SearchLogEntry], backend: &dyn SearchBackend) -> WarmingReport {
        if !self.active() || !self.config.warming_enabled {
            debug!("Cache warming disabled");
            return WarmingReport::default();
        }
        self.warmer.warm(logs, backend, self).await
    }

    /// Review current statistics
    pub fn get_analytics(&self) -> AnalyticsReport {
        let mut report = self.analytics.analyze(self.stats_snapshot());
        if !self.config.analytics_enabled {
            report.recommendations.clear();
        }
        report
    }

    pub fn stats_snapshot(&self) -> CacheStats {
        let local = self.local.stats();
        self.stats.snapshot(local.entries, local.size_bytes)
    }

    pub fn local_stats(&self) -> LocalCacheStats {
        self.local.stats()
    }

    /// Zero the rolling statistics, returning their previous values
    pub fn reset_stats(&self) -> CacheStats {
        let local = self.local.stats();
        self.stats.reset(local.entries, local.size_bytes)
    }

    pub fn stats_since(&self) -> DateTime<Utc> {
        self.stats.last_reset()
    }

    /// Drop expired local entries and forget tags of entries expired in
    /// every tier. Returns the number of local entries removed.
    pub fn purge_expired(&self) -> usize {
        let purged = self.local.purge_expired();
        let untagged = self.invalidator.tags().prune_expired(self.clock.now());
        if untagged > 0 {
            debug!(untagged, "Pruned expired tag index entries");
        }
        purged
    }

    /// Number of keys the invalidation tag index is tracking
    pub fn tagged_keys(&self) -> usize {
        self.invalidator.tags().tracked_keys()
    }

    pub async fn health_check(&self) -> HealthStatus {
        let remote_reachable = match &self.remote {
            Some(remote) => Some(remote.ping().await),
            None => None,
        };

        HealthStatus {
            enabled: self.config.enabled,
            open: self.open.load(Ordering::Acquire),
            local_entries: self.local.len(),
            remote_store: self.remote.as_ref().map(|r| r.store_name().to_string()),
            remote_reachable,
        }
    }

    /// Start the periodic maintenance loop for this service
    pub fn start_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        MaintenanceLoop::new(self.clone(), self.config.maintenance.clone()).spawn()
    }

    /// Stop serving. Later calls behave as if caching were disabled.
    pub fn close(&self) -> AnalyticsReport {
        let report = self.get_analytics();
        if self.open.swap(false, Ordering::AcqRel) {
            info!(
                hit_rate = report.hit_rate,
                total_requests = report.total_requests,
                entry_count = report.entry_count,
                "Search cache closed"
            );
        }
        report
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[async_trait]
impl WarmTarget for CacheService {
    async fn store(&self, request: &SearchRequest, results: &[Record]) -> bool {
        self.set(request, results, None).await
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("enabled", &self.config.enabled)
            .field("open", &self.is_open())
            .field("strategy", &self.engine.strategy_name())
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::stores::MemoryRemoteStore;
    use crate::caching::strategies::testing::{record, FixedStrategy};
    use crate::core::clock::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryRemoteStore>,
        service: CacheService,
    }

    fn fixture(config: CacheConfig) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryRemoteStore::new(clock.clone()));
        let remote: Arc<dyn RemoteStore> = store.clone();
        let service = CacheService::with_components(config, Some(remote), clock.clone())
            .unwrap()
            .with_strategy(FixedStrategy::voting(true, 3600, 9));
        Fixture { clock, store, service }
    }

    fn results() -> Vec<Record> {
        vec![record(json!({"id": "comp_1", "name": "Button", "category": "ui"}))]
    }

    #[tokio::test]
    async fn test_set_then_get_from_local() {
        let f = fixture(CacheConfig::default());
        let request = SearchRequest::new("button");

        assert!(f.service.set(&request, &results(), None).await);
        assert_eq!(f.service.get(&request).await, Some(results()));
        assert_eq!(f.store.ttl_of(f.service.key_for(&request).as_str()), Some(3600));

        let stats = f.service.stats_snapshot();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.sets, 1);
    }

    #[tokio::test]
    async fn test_empty_results_never_cached() {
        let f = fixture(CacheConfig::default());
        assert!(!f.service.set(&SearchRequest::new("react component library"), &[], None).await);
        assert!(f.service.local().is_empty());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_remote_hit_is_promoted_with_short_ttl() {
        let f = fixture(CacheConfig::default());
        let request = SearchRequest::new("button");
        let key = f.service.key_for(&request);

        f.service.set(&request, &results(), None).await;
        f.service.local().clear();

        assert_eq!(f.service.get(&request).await, Some(results()));
        let promoted = f.service.local().peek(&key).unwrap();
        assert_eq!(promoted.ttl_seconds, 300);

        f.clock.advance(Duration::from_secs(301));
        assert!(f.service.local().get(&key).is_none());
    }

    #[tokio::test]
    async fn test_ttl_override_is_clamped() {
        let f = fixture(CacheConfig::default());
        let request = SearchRequest::new("button");

        f.service.set(&request, &results(), Some(5)).await;
        let key = f.service.key_for(&request);
        assert_eq!(f.service.local().peek(&key).unwrap().ttl_seconds, 60);
    }

    #[tokio::test]
    async fn test_disabled_service_is_noop() {
        let f = fixture(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        let request = SearchRequest::new("button");

        assert!(!f.service.set(&request, &results(), None).await);
        assert_eq!(f.service.get(&request).await, None);
        assert_eq!(f.service.stats_snapshot().total_requests(), 0);
    }

    #[tokio::test]
    async fn test_closed_service_is_noop() {
        let f = fixture(CacheConfig::default());
        let request = SearchRequest::new("button");
        f.service.set(&request, &results(), None).await;

        f.service.close();
        assert!(!f.service.is_open());
        assert_eq!(f.service.get(&request).await, None);
        assert!(!f.service.health_check().await.is_healthy());
    }

    #[tokio::test]
    async fn test_invalidate_query_hits_both_tiers() {
        let f = fixture(CacheConfig::default());
        let request = SearchRequest::new("button");
        f.service.set(&request, &results(), None).await;

        let outcome = f.service.invalidate_query(&request).await;
        assert_eq!(outcome.local_removed, 1);
        assert_eq!(outcome.remote_removed, 1);
        assert_eq!(f.service.get(&request).await, None);
    }

    #[tokio::test]
    async fn test_component_event_uses_tags() {
        let f = fixture(CacheConfig::default());
        let request = SearchRequest::new("button");
        f.service.set(&request, &results(), None).await;

        let data = json!({"component_id": "comp_1"}).as_object().cloned().unwrap();
        let outcome = f.service.invalidate_by_event("component_updated", &data).await;

        assert_eq!(outcome.local_removed, 1);
        assert_eq!(outcome.remote_removed, 1);
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_tag_index_stays_bounded() {
        let f = fixture(CacheConfig {
            local_capacity: 2,
            ..Default::default()
        });
        let f = Fixture {
            service: f.service.with_strategy(FixedStrategy::voting(true, 60, 5)),
            ..f
        };

        for i in 0..500 {
            let request = SearchRequest::new(format!("query {}", i));
            let results = vec![record(json!({"id": format!("comp_{}", i)}))];
            assert!(f.service.set(&request, &results, None).await);
            f.clock.advance(Duration::from_secs(120));
            if i % 100 == 99 {
                f.service.purge_expired();
                assert!(f.service.tagged_keys() <= 1);
            }
        }

        f.service.purge_expired();
        assert_eq!(f.service.local().len(), 0);
        assert_eq!(f.service.tagged_keys(), 0);
    }

    #[tokio::test]
    async fn test_oversized_overwrite_is_served_from_remote() {
        let f = fixture(CacheConfig {
            max_cache_size_mb: 1,
            ..Default::default()
        });
        let request = SearchRequest::new("button");
        f.service.set(&request, &results(), None).await;

        let large = vec![record(json!({"id": "comp_1", "description": "x".repeat(2 * 1024 * 1024)}))];
        assert!(f.service.set(&request, &large, None).await);

        assert!(!f.service.local().contains(&f.service.key_for(&request)));
        assert_eq!(f.service.get(&request).await, Some(large));
    }

    #[tokio::test]
    async fn test_health_check() {
        let f = fixture(CacheConfig::default());
        let health = f.service.health_check().await;
        assert!(health.is_healthy());
        assert_eq!(health.remote_store.as_deref(), Some("memory"));
        assert_eq!(health.remote_reachable, Some(true));
    }
}
