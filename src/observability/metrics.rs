//! Metric names emitted by the cache.

use metrics::{describe_counter, describe_gauge, Unit};

/// Hits, labelled by `tier` (`local` or `remote`)
pub const HITS_TOTAL: &str = "search_cache_hits_total";
pub const MISSES_TOTAL: &str = "search_cache_misses_total";
/// `set` calls, labelled by `outcome`
pub const SETS_TOTAL: &str = "search_cache_sets_total";
/// Failed remote operations, labelled by `op`
pub const REMOTE_ERRORS_TOTAL: &str = "search_cache_remote_errors_total";
/// Invalidations, labelled by `action`
pub const INVALIDATIONS_TOTAL: &str = "search_cache_invalidations_total";
pub const WARMED_TOTAL: &str = "search_cache_warmed_total";
pub const HIT_RATE: &str = "search_cache_hit_rate";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(HITS_TOTAL, Unit::Count, "Cache hits by tier");
    describe_counter!(MISSES_TOTAL, Unit::Count, "Lookups that found nothing in either tier");
    describe_counter!(SETS_TOTAL, Unit::Count, "Cache writes by outcome");
    describe_counter!(REMOTE_ERRORS_TOTAL, Unit::Count, "Failed or timed out remote tier operations");
    describe_counter!(INVALIDATIONS_TOTAL, Unit::Count, "Event-driven invalidations by action");
    describe_counter!(WARMED_TOTAL, Unit::Count, "Queries stored by cache warming");
    describe_gauge!(HIT_RATE, Unit::Percent, "Hit rate at the last analytics review");
}
