// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for the backend bridge.
//!
//! Two layers:
//! - [`MetricsCollector`]: buffered operation records with a rolling
//!   retention window, summaries, and batched export to a [`MetricsSink`]
//! - the free functions below, which report straight through the `metrics`
//!   facade. The host application picks the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `backend_bridge_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `provider`: firebase, aws, local
//! - `operation`: get_record, query_records, upload_file, ...
//! - `tier`: local, redis, memory
//! - `status`: success, error, rejected

pub mod collector;
pub mod sink;

use ::metrics::{counter, gauge, histogram};
use std::time::Duration;

pub use collector::{
    dimensions, Dimensions, MetricRecord, MetricSummary, MetricUnit, MetricsCollector,
    MetricsConfig, FlusherHandle,
};
pub use sink::{LogSink, MetricsError, MetricsSink, NoopSink, RecorderSink};

/// Record a provider operation outcome
pub fn record_operation(provider: &str, operation: &str, status: &str) {
    counter!(
        "backend_bridge_operations_total",
        "provider" => provider.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record provider operation latency (one attempt)
pub fn record_latency(provider: &str, operation: &str, duration: Duration) {
    histogram!(
        "backend_bridge_operation_seconds",
        "provider" => provider.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a scheduled retry
pub fn record_retry(operation: &str) {
    counter!(
        "backend_bridge_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record circuit breaker state change (0 = closed, 1 = half-open, 2 = open)
pub fn set_circuit_state(circuit: &str, state: u8) {
    gauge!(
        "backend_bridge_circuit_breaker_state",
        "circuit" => circuit.to_string()
    )
    .set(state as f64);
}

/// Record a call through a circuit breaker
pub fn record_circuit_breaker_call(circuit: &str, outcome: &str) {
    counter!(
        "backend_bridge_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a cache lookup (`result`: hit, miss)
pub fn record_cache_lookup(tier: &str, result: &str) {
    counter!(
        "backend_bridge_cache_lookups_total",
        "tier" => tier.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a degraded cache operation
pub fn record_cache_error(tier: &str, operation: &str) {
    counter!(
        "backend_bridge_cache_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record evicted cache entries
pub fn record_cache_eviction(tier: &str, count: usize) {
    counter!(
        "backend_bridge_cache_evictions_total",
        "tier" => tier.to_string()
    )
    .increment(count as u64);
}

/// Set current local cache size in bytes
pub fn set_local_cache_bytes(bytes: usize) {
    gauge!("backend_bridge_local_cache_bytes").set(bytes as f64);
}

/// Record a collector flush (`count` records handed to the sink)
pub fn record_metrics_flush(count: usize, success: bool) {
    let status = if success { "success" } else { "requeued" };
    counter!(
        "backend_bridge_metrics_flushes_total",
        "status" => status
    )
    .increment(1);
    if success {
        counter!("backend_bridge_metrics_exported_total").increment(count as u64);
    }
}

/// Record migrated items for a task (`outcome`: migrated, failed, planned)
pub fn record_migration_items(task: &str, outcome: &str, count: usize) {
    counter!(
        "backend_bridge_migration_items_total",
        "task" => task.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

    fn counter_value(snapshotter: &Snapshotter, name: &str, label: (&str, &str)) -> Option<u64> {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(key, _, _, value)| {
                let key = key.key();
                let labelled = key
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1);
                match value {
                    DebugValue::Counter(v) if key.name() == name && labelled => Some(v),
                    _ => None,
                }
            })
    }

    #[test]
    fn test_cache_lookup_counter() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        ::metrics::with_local_recorder(&recorder, || {
            record_cache_lookup("local", "hit");
            record_cache_lookup("local", "hit");
            record_cache_lookup("redis", "miss");
        });

        assert_eq!(
            counter_value(&snapshotter, "backend_bridge_cache_lookups_total", ("tier", "local")),
            Some(2)
        );
    }

    #[test]
    fn test_circuit_breaker_call_counter() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        ::metrics::with_local_recorder(&recorder, || {
            record_circuit_breaker_call("local.get_record", "rejected");
        });

        assert_eq!(
            counter_value(
                &snapshotter,
                "backend_bridge_circuit_breaker_calls_total",
                ("outcome", "rejected")
            ),
            Some(1)
        );
    }

    #[test]
    fn test_migration_items_counter() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        ::metrics::with_local_recorder(&recorder, || {
            record_migration_items("users", "migrated", 40);
            record_migration_items("users", "migrated", 2);
        });

        assert_eq!(
            counter_value(&snapshotter, "backend_bridge_migration_items_total", ("task", "users")),
            Some(42)
        );
    }

    // Without a recorder installed the helpers are no-ops
    #[test]
    fn test_helpers_without_recorder() {
        record_operation("local", "get_record", "success");
        record_latency("aws", "query_records", Duration::from_millis(5));
        record_retry("redis_connect");
        set_circuit_state("firebase.upload_file", 2);
        record_cache_error("redis", "set");
        record_cache_eviction("local", 3);
        set_local_cache_bytes(1024);
        record_metrics_flush(100, true);
        record_metrics_flush(100, false);
    }
}
