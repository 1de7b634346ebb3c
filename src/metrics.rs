// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for tiered-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application picks the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tiered_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size counters
//!
//! # Labels
//! - `tier`: local tier name (`heap`, `offheap`, ...) or `remote`
//! - `operation`: get, put, remove, close
//! - `status`: hit, miss, success, error, rejected, too_large, exhausted

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "tiered_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "tiered_cache_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record one eviction from a local tier
pub fn record_eviction(tier: &str, bytes: usize) {
    counter!("tiered_cache_evictions_total", "tier" => tier.to_string()).increment(1);
    counter!("tiered_cache_evicted_bytes_total", "tier" => tier.to_string()).increment(bytes as u64);
}

/// Record a value copied into a faster tier after a hit lower down
pub fn record_promotion(cache: &str, to_tier: &str) {
    counter!(
        "tiered_cache_promotions_total",
        "cache" => cache.to_string(),
        "tier" => to_tier.to_string()
    )
    .increment(1);
}

/// Record a read-through outcome (loaded, absent, stale)
pub fn record_read_through(cache: &str, outcome: &str) {
    counter!(
        "tiered_cache_read_through_total",
        "cache" => cache.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set current usage and limit of a capacity pool
pub fn set_pool_usage(pool: &str, usage: u64, limit: u64) {
    gauge!("tiered_cache_pool_usage", "pool" => pool.to_string()).set(usage as f64);
    gauge!("tiered_cache_pool_limit", "pool" => pool.to_string()).set(limit as f64);
}

/// Set current entry count of a local tier
pub fn set_tier_entries(tier: &str, count: usize) {
    gauge!("tiered_cache_tier_entries", "tier" => tier.to_string()).set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(tier: &str, operation: &str, error_type: &str) {
    counter!(
        "tiered_cache_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a failed connection attempt to the remote store
pub fn record_connection_error(backend: &str) {
    counter!(
        "tiered_cache_connection_errors_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// Record a timeout error
pub fn record_timeout(tier: &str, operation: &str) {
    counter!(
        "tiered_cache_timeouts_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a retry loop that gave up
pub fn record_retry_exhausted(operation: &str) {
    counter!(
        "tiered_cache_retry_exhausted_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record circuit breaker call
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "tiered_cache_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

/// Record manager state transition
pub fn set_manager_state(state: &str) {
    counter!(
        "tiered_cache_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record total time spent opening a manager
pub fn record_open_duration(duration: Duration) {
    histogram!("tiered_cache_open_seconds").record(duration.as_secs_f64());
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without an installed recorder these are no-ops; they must never panic.
    #[test]
    fn test_record_without_recorder() {
        record_operation("heap", "get", "hit");
        record_latency("remote", "put", Duration::from_millis(5));
        record_eviction("offheap", 128);
        set_pool_usage("heap-entries", 10, 1000);
        record_retry_exhausted("remote_get");
        set_manager_state("Ready");
    }

    #[test]
    fn test_operation_counter_is_labelled() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_operation("heap", "get", "hit");
            record_operation("heap", "get", "hit");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let hits = snapshot
            .into_iter()
            .find(|(key, _, _, _)| {
                key.key().name() == "tiered_cache_operations_total"
                    && key.key().labels().any(|l| l.key() == "status" && l.value() == "hit")
            })
            .map(|(_, _, _, value)| value);
        assert_eq!(hits, Some(DebugValue::Counter(2)));
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let _timer = LatencyTimer::new("cache", "get");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert!(snapshot
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "tiered_cache_operation_seconds"));
    }
}
