//! # Cache Analytics
//!
//! Process-wide counters and the rule-based performance review built on top
//! of them.

use crate::core::clock::Clock;
use crate::observability::metrics as names;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub const RECOMMEND_INCREASE_TTL: &str = "Hit rate is below 50%: increase TTL for frequently repeated queries";
pub const RECOMMEND_INCREASE_SIZE: &str = "Evictions exceed 10% of stored entries: increase cache size";
pub const RECOMMEND_COMPRESSION: &str = "Cache is above 90% of its size budget: enable compression";

/// Snapshot of the rolling service statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub total_size_mb: f64,
    pub entry_count: usize,
    pub eviction_count: u64,
    pub sets: u64,
    pub rejections: u64,
    pub remote_errors: u64,
    pub since: DateTime<Utc>,
}

impl CacheStats {
    pub fn total_requests(&self) -> u64 {
        self.hit_count + self.miss_count
    }
}

/// Accumulates service-wide counters until reset
pub struct StatsRecorder {
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    rejections: AtomicU64,
    evictions: AtomicU64,
    remote_errors: AtomicU64,
    since: Mutex<DateTime<Utc>>,
}

impl StatsRecorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let since = clock.now();
        Self {
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            since: Mutex::new(since),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a `set` outcome
    pub fn record_set(&self, stored: bool) {
        if stored {
            self.sets.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_remote_error(&self) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counters combined with the local tier's occupancy
    pub fn snapshot(&self, entry_count: usize, size_bytes: usize) -> CacheStats {
        let hit_count = self.hits.load(Ordering::Relaxed);
        let miss_count = self.misses.load(Ordering::Relaxed);
        let total = hit_count + miss_count;

        CacheStats {
            hit_count,
            miss_count,
            hit_rate: if total > 0 { hit_count as f64 / total as f64 } else { 0.0 },
            total_size_mb: size_bytes as f64 / BYTES_PER_MB,
            entry_count,
            eviction_count: self.evictions.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            since: *self.since.lock(),
        }
    }

    /// Zero the counters and return their values from before the reset
    pub fn reset(&self, entry_count: usize, size_bytes: usize) -> CacheStats {
        let mut since = self.since.lock();
        let hit_count = self.hits.swap(0, Ordering::Relaxed);
        let miss_count = self.misses.swap(0, Ordering::Relaxed);
        let total = hit_count + miss_count;

        let previous = CacheStats {
            hit_count,
            miss_count,
            hit_rate: if total > 0 { hit_count as f64 / total as f64 } else { 0.0 },
            total_size_mb: size_bytes as f64 / BYTES_PER_MB,
            entry_count,
            eviction_count: self.evictions.swap(0, Ordering::Relaxed),
            sets: self.sets.swap(0, Ordering::Relaxed),
            rejections: self.rejections.swap(0, Ordering::Relaxed),
            remote_errors: self.remote_errors.swap(0, Ordering::Relaxed),
            since: *since,
        };
        *since = self.clock.now();
        previous
    }

    pub fn last_reset(&self) -> DateTime<Utc> {
        *self.since.lock()
    }
}

impl std::fmt::Debug for StatsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRecorder")
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .field("since", &self.last_reset())
            .finish()
    }
}

/// Result of a performance review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub hit_rate: f64,
    pub total_requests: u64,
    pub cache_size_mb: f64,
    pub entry_count: usize,
    pub avg_entry_size_kb: f64,
    pub eviction_count: u64,
    pub recommendations: Vec<String>,
    pub stats: CacheStats,
}

/// Turns a stats snapshot into a report with recommendations
#[derive(Debug, Clone)]
pub struct Analytics {
    max_size_mb: f64,
    compression_enabled: bool,
}

impl Analytics {
    pub fn new(max_size_bytes: usize, compression_enabled: bool) -> Self {
        Self {
            max_size_mb: max_size_bytes as f64 / BYTES_PER_MB,
            compression_enabled,
        }
    }

    pub fn analyze(&self, stats: CacheStats) -> AnalyticsReport {
        let total_requests = stats.total_requests();
        let avg_entry_size_kb = if stats.entry_count > 0 {
            stats.total_size_mb * 1024.0 / stats.entry_count as f64
        } else {
            0.0
        };

        let mut recommendations = Vec::new();
        if total_requests > 0 && stats.hit_rate < 0.5 {
            recommendations.push(RECOMMEND_INCREASE_TTL.to_string());
        }
        if stats.eviction_count as f64 > stats.entry_count as f64 * 0.1 {
            recommendations.push(RECOMMEND_INCREASE_SIZE.to_string());
        }
        if !self.compression_enabled && self.max_size_mb > 0.0 && stats.total_size_mb > self.max_size_mb * 0.9 {
            recommendations.push(RECOMMEND_COMPRESSION.to_string());
        }

        metrics::gauge!(names::HIT_RATE).set(stats.hit_rate);

        AnalyticsReport {
            hit_rate: stats.hit_rate,
            total_requests,
            cache_size_mb: stats.total_size_mb,
            entry_count: stats.entry_count,
            avg_entry_size_kb,
            eviction_count: stats.eviction_count,
            recommendations,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_snapshot_and_reset() {
        let clock = Arc::new(ManualClock::starting_now());
        let recorder = StatsRecorder::new(clock.clone());
        let started = recorder.last_reset();

        recorder.record_hit();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        recorder.record_set(true);
        recorder.record_set(false);
        recorder.record_evictions(2);

        let stats = recorder.snapshot(4, 2 * 1024 * 1024);
        assert_eq!(stats.hit_rate, 0.75);
        assert_eq!(stats.total_size_mb, 2.0);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.rejections, 1);

        clock.advance(Duration::from_secs(3600));
        let previous = recorder.reset(4, 0);
        assert_eq!(previous.hit_count, 3);
        assert_eq!(previous.eviction_count, 2);
        assert_eq!(previous.since, started);

        let fresh = recorder.snapshot(4, 0);
        assert_eq!(fresh.total_requests(), 0);
        assert_eq!(fresh.since, clock.now());
    }

    #[test]
    fn test_recommendations() {
        let analytics = Analytics::new(10 * 1024 * 1024, false);
        let report = analytics.analyze(CacheStats {
            hit_count: 1,
            miss_count: 3,
            hit_rate: 0.25,
            total_size_mb: 9.5,
            entry_count: 10,
            eviction_count: 2,
            ..Default::default()
        });

        assert_eq!(report.total_requests, 4);
        assert!((report.avg_entry_size_kb - 972.8).abs() < 1e-9);
        assert_eq!(
            report.recommendations,
            vec![
                RECOMMEND_INCREASE_TTL.to_string(),
                RECOMMEND_INCREASE_SIZE.to_string(),
                RECOMMEND_COMPRESSION.to_string(),
            ]
        );
    }

    #[test]
    fn test_healthy_cache_has_no_recommendations() {
        let analytics = Analytics::new(10 * 1024 * 1024, true);
        let report = analytics.analyze(CacheStats {
            hit_count: 9,
            miss_count: 1,
            hit_rate: 0.9,
            total_size_mb: 9.9,
            entry_count: 10,
            eviction_count: 1,
            ..Default::default()
        });
        assert!(report.recommendations.is_empty());
    }
}
