//! Periodic background maintenance: performance review, expired-entry purge
//! and rolling statistics reset.

use super::analytics::{AnalyticsReport, CacheStats};
use super::service::CacheService;
use crate::core::clock::{seconds_between, Clock};
use crate::core::config::MaintenanceConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one maintenance pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub ran_at: DateTime<Utc>,
    pub analytics: AnalyticsReport,
    pub purged_entries: usize,
    /// Counter values from just before a reset, when one happened
    pub reset_stats: Option<CacheStats>,
}

pub struct MaintenanceLoop {
    service: Arc<CacheService>,
    config: MaintenanceConfig,
}

impl MaintenanceLoop {
    pub fn new(service: Arc<CacheService>, config: MaintenanceConfig) -> Self {
        Self { service, config }
    }

    /// One maintenance pass
    pub fn run_once(&self) -> MaintenanceReport {
        let ran_at = self.service.clock().now();
        let purged_entries = self.service.purge_expired();
        let analytics = self.service.get_analytics();

        for recommendation in &analytics.recommendations {
            info!(
                hit_rate = analytics.hit_rate,
                entry_count = analytics.entry_count,
                recommendation = %recommendation,
                "Cache tuning recommendation"
            );
        }

        let stats_age = seconds_between(self.service.stats_since(), ran_at);
        let reset_stats = if stats_age >= self.config.stats_reset_interval.as_secs_f64() {
            let previous = self.service.reset_stats();
            info!(
                hits = previous.hit_count,
                misses = previous.miss_count,
                hit_rate = previous.hit_rate,
                evictions = previous.eviction_count,
                sets = previous.sets,
                rejections = previous.rejections,
                remote_errors = previous.remote_errors,
                "Resetting rolling cache statistics"
            );
            Some(previous)
        } else {
            None
        };

        debug!(purged_entries, "Maintenance pass completed");
        MaintenanceReport {
            ran_at,
            analytics,
            purged_entries,
            reset_stats,
        }
    }

    /// Run on the configured interval until the handle is stopped. The first
    /// pass happens one interval after start.
    pub fn spawn(self) -> MaintenanceHandle {
        let token = CancellationToken::new();
        let last_report = Arc::new(Mutex::new(None));

        let task = {
            let token = token.clone();
            let last_report = last_report.clone();
            tokio::spawn(async move {
                let period = self.config.interval;
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                info!(interval = ?period, "Maintenance loop started");
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            let report = self.run_once();
                            *last_report.lock() = Some(report);
                        }
                    }
                }
                info!("Maintenance loop stopped");
            })
        };

        MaintenanceHandle {
            token,
            task,
            last_report,
        }
    }
}

impl std::fmt::Debug for MaintenanceLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceLoop").field("config", &self.config).finish()
    }
}

/// Handle to a running maintenance loop
#[derive(Debug)]
pub struct MaintenanceHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    last_report: Arc<Mutex<Option<MaintenanceReport>>>,
}

impl MaintenanceHandle {
    pub fn last_report(&self) -> Option<MaintenanceReport> {
        self.last_report.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop, wait for it to finish, and return the last report it produced
    pub async fn stop(self) -> Option<MaintenanceReport> {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }
        self.last_report.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::stores::{MemoryRemoteStore, RemoteStore};
    use crate::core::clock::ManualClock;
    use crate::core::config::CacheConfig;
    use crate::core::types::{CacheKey, SearchRequest};
    use serde_json::json;
    use std::time::Duration;

    fn service(clock: Arc<ManualClock>) -> Arc<CacheService> {
        let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemoteStore::new(clock.clone()));
        Arc::new(CacheService::with_components(CacheConfig::default(), Some(remote), clock).unwrap())
    }

    #[tokio::test]
    async fn test_run_once_resets_stats_after_interval() {
        let clock = Arc::new(ManualClock::starting_now());
        let service = service(clock.clone());
        let maintenance = MaintenanceLoop::new(service.clone(), MaintenanceConfig::default());

        service.get(&SearchRequest::new("button")).await;

        let first = maintenance.run_once();
        assert!(first.reset_stats.is_none());
        assert_eq!(first.analytics.total_requests, 1);

        clock.advance(Duration::from_secs(3600));
        let second = maintenance.run_once();
        let previous = second.reset_stats.expect("stats reset after an hour");
        assert_eq!(previous.miss_count, 1);
        assert_eq!(service.get_analytics().total_requests, 0);
        assert_eq!(service.stats_since(), clock.now());
    }

    #[tokio::test]
    async fn test_run_once_purges_expired_entries() {
        let clock = Arc::new(ManualClock::starting_now());
        let service = service(clock.clone());
        service.local().set(CacheKey::new("search:old"), vec![json!({"id": 1}).as_object().cloned().unwrap()], 60).unwrap();

        clock.advance(Duration::from_secs(61));
        let report = MaintenanceLoop::new(service.clone(), MaintenanceConfig::default()).run_once();
        assert_eq!(report.purged_entries, 1);
        assert!(service.local().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_stops_with_last_report() {
        let clock = Arc::new(ManualClock::starting_now());
        let service = service(clock);
        let config = MaintenanceConfig {
            interval: Duration::from_secs(60),
            ..Default::default()
        };

        let handle = MaintenanceLoop::new(service, config).spawn();
        assert!(handle.last_report().is_none());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(handle.is_running());
        assert!(handle.last_report().is_some());

        let last = handle.stop().await;
        assert!(last.is_some());
    }
}
