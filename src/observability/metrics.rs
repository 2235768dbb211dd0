//! # Metrics
//!
//! Thin recording helpers over the `metrics` facade. The library never
//! installs an exporter; without a recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Duration;

pub const CACHE_HITS: &str = "campus_cache_hits_total";
pub const CACHE_MISSES: &str = "campus_cache_misses_total";
pub const CACHE_TIER_ERRORS: &str = "campus_cache_tier_errors_total";
pub const STORE_FETCHES: &str = "campus_store_fetches_total";
pub const STORE_FETCH_DURATION: &str = "campus_store_fetch_duration_seconds";
pub const KEYS_INVALIDATED: &str = "campus_cache_keys_invalidated_total";
pub const PREDICTIONS: &str = "campus_predictions_total";
pub const PREDICTION_DURATION: &str = "campus_prediction_duration_seconds";
pub const PREDICTION_RESULTS: &str = "campus_prediction_results";

/// Register descriptions with whatever recorder the host installed
pub fn describe_metrics() {
    describe_counter!(CACHE_HITS, Unit::Count, "Cache hits by level (local, shared)");
    describe_counter!(CACHE_MISSES, Unit::Count, "Reads that missed both cache tiers");
    describe_counter!(CACHE_TIER_ERRORS, Unit::Count, "Swallowed cache tier failures");
    describe_counter!(STORE_FETCHES, Unit::Count, "Store fetches after a cache miss");
    describe_histogram!(STORE_FETCH_DURATION, Unit::Seconds, "Store fetch latency");
    describe_counter!(KEYS_INVALIDATED, Unit::Count, "Cache keys removed by invalidation");
    describe_counter!(PREDICTIONS, Unit::Count, "Prediction requests by outcome");
    describe_histogram!(PREDICTION_DURATION, Unit::Seconds, "Prediction latency");
    describe_histogram!(PREDICTION_RESULTS, Unit::Count, "Ranked results per prediction");
}

pub fn record_cache_hit(level: &'static str) {
    counter!(CACHE_HITS, "level" => level).increment(1);
}

pub fn record_cache_miss() {
    counter!(CACHE_MISSES).increment(1);
}

pub fn record_tier_error(tier: &'static str, operation: &'static str) {
    counter!(CACHE_TIER_ERRORS, "tier" => tier, "operation" => operation).increment(1);
}

pub fn record_store_fetch(elapsed: Duration, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(STORE_FETCHES, "outcome" => outcome).increment(1);
    histogram!(STORE_FETCH_DURATION).record(elapsed.as_secs_f64());
}

pub fn record_invalidation(entity: &'static str, keys: usize) {
    counter!(KEYS_INVALIDATED, "entity" => entity).increment(keys as u64);
}

pub fn record_prediction(elapsed: Duration, results: Option<usize>) {
    let outcome = if results.is_some() { "ok" } else { "error" };
    counter!(PREDICTIONS, "outcome" => outcome).increment(1);
    histogram!(PREDICTION_DURATION).record(elapsed.as_secs_f64());
    if let Some(count) = results {
        histogram!(PREDICTION_RESULTS).record(count as f64);
    }
}
