//! Prometheus metrics for the cache client.
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the cache client.
pub mod names {
    /// Reads answered from a cached value.
    pub const CACHE_HITS_TOTAL: &str = "hmdp_cache_hits_total";
    /// Reads answered from a null marker.
    pub const CACHE_NULL_HITS_TOTAL: &str = "hmdp_cache_null_hits_total";
    /// Reads that found no key.
    pub const CACHE_MISSES_TOTAL: &str = "hmdp_cache_misses_total";
    /// Logical-expire reads that served a stale value.
    pub const CACHE_STALE_TOTAL: &str = "hmdp_cache_stale_total";
    /// Loader invocations.
    pub const CACHE_LOADS_TOTAL: &str = "hmdp_cache_loads_total";
    /// Loader duration in seconds.
    pub const CACHE_LOAD_DURATION_SECONDS: &str = "hmdp_cache_load_duration_seconds";
    /// Lock attempts, labelled by outcome.
    pub const CACHE_LOCK_ATTEMPTS_TOTAL: &str = "hmdp_cache_lock_attempts_total";
    /// Mutex reads that gave up after the retry budget.
    pub const CACHE_BUSY_TOTAL: &str = "hmdp_cache_busy_total";
    /// Entries that failed to decode.
    pub const CACHE_CORRUPTIONS_TOTAL: &str = "hmdp_cache_corruptions_total";
    /// Reads served from the source of truth because the store failed.
    pub const CACHE_STORE_FALLBACKS_TOTAL: &str = "hmdp_cache_store_fallbacks_total";
    /// Background rebuilds, labelled by outcome.
    pub const CACHE_REBUILDS_TOTAL: &str = "hmdp_cache_rebuilds_total";
    /// Rebuild worker pool size.
    pub const CACHE_REBUILD_WORKERS: &str = "hmdp_cache_rebuild_workers";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Reads answered from a cached value");
    describe_counter!(names::CACHE_NULL_HITS_TOTAL, "Reads answered from a null marker");
    describe_counter!(names::CACHE_MISSES_TOTAL, "Reads that found no cache key");
    describe_counter!(
        names::CACHE_STALE_TOTAL,
        "Logical-expire reads that returned a stale value"
    );
    describe_counter!(names::CACHE_LOADS_TOTAL, "Source of truth loads");
    describe_histogram!(
        names::CACHE_LOAD_DURATION_SECONDS,
        "Source of truth load duration in seconds"
    );
    describe_counter!(names::CACHE_LOCK_ATTEMPTS_TOTAL, "Rebuild lock attempts");
    describe_counter!(
        names::CACHE_BUSY_TOTAL,
        "Mutex reads that gave up waiting for the rebuild lock"
    );
    describe_counter!(names::CACHE_CORRUPTIONS_TOTAL, "Cache entries that failed to decode");
    describe_counter!(
        names::CACHE_STORE_FALLBACKS_TOTAL,
        "Reads served from the source of truth after a store failure"
    );
    describe_counter!(names::CACHE_REBUILDS_TOTAL, "Background cache rebuilds");
    describe_gauge!(names::CACHE_REBUILD_WORKERS, "Rebuild worker pool size");
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a hit.
    pub fn hit(strategy: &'static str) {
        counter!(names::CACHE_HITS_TOTAL, "strategy" => strategy).increment(1);
    }

    /// Record a null marker hit.
    pub fn null_hit(strategy: &'static str) {
        counter!(names::CACHE_NULL_HITS_TOTAL, "strategy" => strategy).increment(1);
    }

    /// Record a miss.
    pub fn miss(strategy: &'static str) {
        counter!(names::CACHE_MISSES_TOTAL, "strategy" => strategy).increment(1);
    }

    /// Record a stale read.
    pub fn stale() {
        counter!(names::CACHE_STALE_TOTAL).increment(1);
    }

    /// Record a loader call.
    pub fn load(strategy: &'static str, found: bool, duration: Duration) {
        counter!(
            names::CACHE_LOADS_TOTAL,
            "strategy" => strategy,
            "found" => if found { "true" } else { "false" }
        )
        .increment(1);
        histogram!(names::CACHE_LOAD_DURATION_SECONDS, "strategy" => strategy)
            .record(duration.as_secs_f64());
    }

    /// Record a lock attempt.
    pub fn lock_attempt(acquired: bool) {
        counter!(
            names::CACHE_LOCK_ATTEMPTS_TOTAL,
            "outcome" => if acquired { "acquired" } else { "contended" }
        )
        .increment(1);
    }

    /// Record a mutex read giving up.
    pub fn busy() {
        counter!(names::CACHE_BUSY_TOTAL).increment(1);
    }

    /// Record a corrupt entry.
    pub fn corruption() {
        counter!(names::CACHE_CORRUPTIONS_TOTAL).increment(1);
    }

    /// Record a read served around a failed store.
    pub fn store_fallback(strategy: &'static str) {
        counter!(names::CACHE_STORE_FALLBACKS_TOTAL, "strategy" => strategy).increment(1);
    }

    /// Record a background rebuild outcome (`ok`, `failed`, `rejected`, `abandoned`).
    pub fn rebuild(outcome: &'static str) {
        counter!(names::CACHE_REBUILDS_TOTAL, "outcome" => outcome).increment(1);
    }

    /// Record the rebuild worker pool size.
    pub fn rebuild_workers(count: usize) {
        gauge!(names::CACHE_REBUILD_WORKERS).set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            names::CACHE_HITS_TOTAL,
            names::CACHE_MISSES_TOTAL,
            names::CACHE_REBUILDS_TOTAL,
            names::CACHE_REBUILD_WORKERS,
        ] {
            assert!(name.starts_with("hmdp_cache_"));
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metrics();
        CacheMetrics::hit("mutex");
        CacheMetrics::load("pass_through", false, Duration::from_millis(3));
        CacheMetrics::lock_attempt(true);
        CacheMetrics::rebuild("ok");
        CacheMetrics::rebuild_workers(10);
    }
}
