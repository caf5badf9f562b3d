//! Prometheus metrics for tweet-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Cache lookups by component and result (hit, miss, error).
pub static CACHE_LOOKUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tweet_cache_lookups_total",
        "Total number of cache lookups",
        &["component", "result"]
    )
    .expect("Failed to register cache_lookups_total")
});

/// Cache writes that failed and were swallowed.
pub static CACHE_WRITE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tweet_cache_write_failures_total",
        "Total number of cache writes that failed and were skipped",
        &["component"]
    )
    .expect("Failed to register cache_write_failures_total")
});

/// Reads answered by resolving against the store instead of the cache.
pub static FALLBACKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tweet_permission_fallbacks_total",
        "Total number of reads answered through the permission resolver",
        &["operation", "reason"]
    )
    .expect("Failed to register permission_fallbacks_total")
});

/// Parent hops needed to reach a permission decision.
pub static RESOLVER_DEPTH: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tweet_permission_resolver_depth",
        "Parent hops traversed per permission resolution",
        &["axis"],
        vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 64.0]
    )
    .expect("Failed to register permission_resolver_depth")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tweet_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tweet_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&CACHE_LOOKUPS_TOTAL);
    Lazy::force(&CACHE_WRITE_FAILURES_TOTAL);
    Lazy::force(&FALLBACKS_TOTAL);
    Lazy::force(&RESOLVER_DEPTH);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
