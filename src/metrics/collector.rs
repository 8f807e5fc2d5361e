// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Buffered metrics collector.
//!
//! Records accumulate in a buffer and are exported to a [`MetricsSink`] when
//! the buffer reaches `flush_count` entries or every `flush_interval`,
//! whichever comes first. Export is at-least-once: a failed batch goes back to
//! the front of the buffer in its original order.
//!
//! Independently of export, every record is kept in a history window
//! (`retention`, default one hour) that [`MetricsCollector::get_summary`]
//! aggregates over. Records older than the window are purged on each flush.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sink::{MetricsError, MetricsSink};

pub type Dimensions = BTreeMap<String, String>;

/// Build a dimension map from string pairs.
pub fn dimensions(pairs: &[(&str, &str)]) -> Dimensions {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Count,
    Milliseconds,
    Bytes,
    Percent,
}

impl std::fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Count => "count",
            Self::Milliseconds => "milliseconds",
            Self::Bytes => "bytes",
            Self::Percent => "percent",
        };
        f.write_str(s)
    }
}

/// One exported data point: `{name, value, unit, timestamp, dimensions}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Collector buffering and retention settings
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Flush once this many records are buffered (default: 100)
    #[serde(default = "default_flush_count")]
    pub flush_count: usize,

    /// Flush at least this often (default: 60s)
    #[serde(
        rename = "flush_interval_ms",
        default = "default_flush_interval",
        with = "crate::config::serde_millis"
    )]
    pub flush_interval: Duration,

    /// History kept for summaries (default: 1 hour)
    #[serde(
        rename = "retention_ms",
        default = "default_retention",
        with = "crate::config::serde_millis"
    )]
    pub retention: Duration,

    /// Prefix used by [`super::RecorderSink`] when exporting to the facade
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Hard cap on unexported records; the oldest are dropped beyond it
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,
}

fn default_flush_count() -> usize { 100 }
fn default_flush_interval() -> Duration { Duration::from_secs(60) }
fn default_retention() -> Duration { Duration::from_secs(3600) }
fn default_namespace() -> String { "backend_bridge".to_string() }
fn default_max_buffered() -> usize { 10_000 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            flush_count: default_flush_count(),
            flush_interval: default_flush_interval(),
            retention: default_retention(),
            namespace: default_namespace(),
            max_buffered: default_max_buffered(),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Default)]
struct CollectorState {
    buffer: VecDeque<MetricRecord>,
    history: VecDeque<MetricRecord>,
    dropped: u64,
}

pub struct MetricsCollector {
    config: MetricsConfig,
    sink: Arc<dyn MetricsSink>,
    state: Mutex<CollectorState>,
    flush_needed: Notify,
    /// Serializes flushes so a requeued batch can't interleave with a newer one
    flush_lock: tokio::sync::Mutex<()>,
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(CollectorState::default()),
            flush_needed: Notify::new(),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn record(&self, name: &str, value: f64, unit: MetricUnit, dimensions: Dimensions) {
        self.push(MetricRecord {
            name: name.to_string(),
            value,
            unit,
            timestamp: now_millis(),
            dimensions,
        });
    }

    pub fn record_success(&self, operation: &str, dimensions: Dimensions) {
        self.record(&format!("{}.success", operation), 1.0, MetricUnit::Count, dimensions);
    }

    /// Count a failure; the error text is kept as the `error` dimension.
    pub fn record_error(
        &self,
        operation: &str,
        error: &dyn std::fmt::Display,
        mut dimensions: Dimensions,
    ) {
        dimensions.insert("error".to_string(), error.to_string());
        self.record(&format!("{}.error", operation), 1.0, MetricUnit::Count, dimensions);
    }

    pub fn record_latency(&self, operation: &str, elapsed: Duration, dimensions: Dimensions) {
        self.record(
            &format!("{}.latency", operation),
            elapsed.as_secs_f64() * 1000.0,
            MetricUnit::Milliseconds,
            dimensions,
        );
    }

    /// Append a fully-formed record (timestamp included).
    pub fn push(&self, record: MetricRecord) {
        let flush_due = {
            let mut state = self.state.lock();
            state.history.push_back(record.clone());
            state.buffer.push_back(record);
            self.enforce_cap(&mut state);
            state.buffer.len() >= self.config.flush_count
        };
        if flush_due {
            self.flush_needed.notify_one();
        }
    }

    fn enforce_cap(&self, state: &mut CollectorState) {
        let mut dropped = 0u64;
        while state.buffer.len() > self.config.max_buffered {
            state.buffer.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            state.dropped += dropped;
            warn!(dropped, cap = self.config.max_buffered, "Metrics buffer full, dropped oldest records");
        }
    }

    fn purge_history(&self, state: &mut CollectorState) -> usize {
        let cutoff = now_millis() - self.config.retention.as_millis() as i64;
        let before = state.history.len();
        state.history.retain(|r| r.timestamp >= cutoff);
        before - state.history.len()
    }

    /// Export everything buffered. Returns how many records were exported.
    ///
    /// On sink failure the batch is put back at the front of the buffer.
    pub async fn flush(&self) -> Result<usize, MetricsError> {
        let _guard = self.flush_lock.lock().await;

        let batch: Vec<MetricRecord> = {
            let mut state = self.state.lock();
            let purged = self.purge_history(&mut state);
            if purged > 0 {
                debug!(purged, "Purged metrics older than retention window");
            }
            state.buffer.drain(..).collect()
        };

        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        match self.sink.export(&batch).await {
            Ok(()) => {
                debug!(count, "Flushed metrics");
                crate::metrics::record_metrics_flush(count, true);
                Ok(count)
            }
            Err(e) => {
                warn!(count, error = %e, "Metrics export failed, requeueing batch");
                crate::metrics::record_metrics_flush(count, false);
                let mut state = self.state.lock();
                for record in batch.into_iter().rev() {
                    state.buffer.push_front(record);
                }
                self.enforce_cap(&mut state);
                Err(e)
            }
        }
    }

    /// Per-name aggregates over the retained history.
    #[must_use]
    pub fn get_summary(&self) -> BTreeMap<String, MetricSummary> {
        let state = self.state.lock();
        let mut summary: BTreeMap<String, MetricSummary> = BTreeMap::new();

        for record in &state.history {
            summary
                .entry(record.name.clone())
                .and_modify(|s| {
                    s.count += 1;
                    s.sum += record.value;
                    s.min = s.min.min(record.value);
                    s.max = s.max.max(record.value);
                })
                .or_insert(MetricSummary {
                    count: 1,
                    sum: record.value,
                    min: record.value,
                    max: record.value,
                    avg: 0.0,
                });
        }
        for s in summary.values_mut() {
            s.avg = s.sum / s.count as f64;
        }
        summary
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    #[must_use]
    pub fn retained(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Records lost to the buffer cap since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Final flush; call before dropping the collector.
    pub async fn shutdown(&self) -> Result<usize, MetricsError> {
        let flushed = self.flush().await?;
        info!(flushed, "Metrics collector shut down");
        Ok(flushed)
    }

    /// Run the count/interval flush triggers on a background task.
    ///
    /// Cancelling `cancel` (or calling [`FlusherHandle::shutdown`]) stops the
    /// task after one last flush.
    pub fn spawn_flusher(self: &Arc<Self>, cancel: CancellationToken) -> FlusherHandle {
        let collector = Arc::clone(self);
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(collector.config.flush_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        if let Err(e) = collector.shutdown().await {
                            warn!(error = %e, "Final metrics flush failed");
                        }
                        break;
                    }
                    _ = collector.flush_needed.notified() => {}
                    _ = interval.tick() => {}
                }

                if let Err(e) = collector.flush().await {
                    warn!(error = %e, "Background metrics flush failed");
                }
            }
        });

        FlusherHandle { cancel, join }
    }
}

/// Handle to the background flush task.
pub struct FlusherHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl FlusherHandle {
    /// Ask the task to stop without waiting for it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait for its final flush.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Metrics flusher task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Keeps every exported batch; can be told to fail.
    #[derive(Default)]
    struct MemorySink {
        batches: Mutex<Vec<Vec<MetricRecord>>>,
        failing: AtomicBool,
    }

    impl MemorySink {
        fn exported(&self) -> Vec<MetricRecord> {
            self.batches.lock().iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl MetricsSink for MemorySink {
        async fn export(&self, batch: &[MetricRecord]) -> Result<(), MetricsError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(MetricsError::Export("sink offline".into()));
            }
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    fn collector(config: MetricsConfig) -> (Arc<MetricsCollector>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        (Arc::new(MetricsCollector::new(config, sink.clone())), sink)
    }

    #[tokio::test]
    async fn test_summary_aggregates() {
        let (c, _) = collector(MetricsConfig::default());
        for ms in [10, 20, 60] {
            c.record_latency("get_record", Duration::from_millis(ms), Dimensions::new());
        }
        c.record_success("get_record", Dimensions::new());

        let summary = c.get_summary();
        let latency = summary["get_record.latency"];
        assert_eq!(latency.count, 3);
        assert!((latency.sum - 90.0).abs() < 1e-9);
        assert!((latency.min - 10.0).abs() < 1e-9);
        assert!((latency.max - 60.0).abs() < 1e-9);
        assert!((latency.avg - 30.0).abs() < 1e-9);
        assert_eq!(summary["get_record.success"].count, 1);
    }

    #[tokio::test]
    async fn test_error_dimension() {
        let (c, sink) = collector(MetricsConfig::default());
        c.record_error("upload_file", &"quota exceeded", dimensions(&[("provider", "aws")]));
        c.flush().await.unwrap();

        let exported = sink.exported();
        assert_eq!(exported[0].name, "upload_file.error");
        assert_eq!(exported[0].dimensions["error"], "quota exceeded");
        assert_eq!(exported[0].dimensions["provider"], "aws");
    }

    #[tokio::test]
    async fn test_failed_export_requeues_at_front() {
        let (c, sink) = collector(MetricsConfig::default());
        c.record("a", 1.0, MetricUnit::Count, Dimensions::new());
        c.record("b", 2.0, MetricUnit::Count, Dimensions::new());

        sink.failing.store(true, Ordering::SeqCst);
        assert!(c.flush().await.is_err());
        assert_eq!(c.buffered(), 2);

        // Newer record lands behind the requeued batch
        c.record("c", 3.0, MetricUnit::Count, Dimensions::new());
        sink.failing.store(false, Ordering::SeqCst);
        assert_eq!(c.flush().await.unwrap(), 3);

        let names: Vec<String> = sink.exported().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(c.buffered(), 0);
    }

    #[tokio::test]
    async fn test_flush_purges_old_history() {
        let (c, _) = collector(MetricsConfig::default());
        c.push(MetricRecord {
            name: "stale".into(),
            value: 1.0,
            unit: MetricUnit::Count,
            timestamp: now_millis() - 2 * 3600 * 1000,
            dimensions: Dimensions::new(),
        });
        c.record("fresh", 1.0, MetricUnit::Count, Dimensions::new());
        assert_eq!(c.retained(), 2);

        c.flush().await.unwrap();

        let summary = c.get_summary();
        assert!(!summary.contains_key("stale"));
        assert!(summary.contains_key("fresh"));
    }

    #[tokio::test]
    async fn test_buffer_cap_drops_oldest() {
        let (c, _) = collector(MetricsConfig {
            max_buffered: 3,
            flush_count: 100,
            ..MetricsConfig::default()
        });
        for i in 0..5 {
            c.record(&format!("m{}", i), 1.0, MetricUnit::Count, Dimensions::new());
        }

        assert_eq!(c.buffered(), 3);
        assert_eq!(c.dropped(), 2);
    }

    #[tokio::test]
    async fn test_flusher_flushes_on_count() {
        let (c, sink) = collector(MetricsConfig {
            flush_count: 3,
            flush_interval: Duration::from_secs(3600),
            ..MetricsConfig::default()
        });
        let handle = c.spawn_flusher(CancellationToken::new());

        for _ in 0..3 {
            c.record_success("query_records", Dimensions::new());
        }

        // Give the background task a chance to run
        for _ in 0..50 {
            if c.buffered() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.exported().len(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flusher_flushes_on_interval() {
        let (c, sink) = collector(MetricsConfig {
            flush_count: 100,
            flush_interval: Duration::from_secs(60),
            ..MetricsConfig::default()
        });
        let handle = c.spawn_flusher(CancellationToken::new());
        tokio::task::yield_now().await;

        c.record_success("get_record", Dimensions::new());
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(sink.exported().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_performs_final_flush() {
        let (c, sink) = collector(MetricsConfig::default());
        let handle = c.spawn_flusher(CancellationToken::new());

        c.record_success("delete_record", Dimensions::new());
        handle.shutdown().await;

        assert_eq!(sink.exported().len(), 1);
        assert_eq!(c.buffered(), 0);
    }
}
