// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Export targets for collector batches.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use super::collector::{MetricRecord, MetricUnit};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("metrics export failed: {0}")]
    Export(String),
}

/// Receives flushed batches. An error keeps the batch buffered for the next flush.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn export(&self, batch: &[MetricRecord]) -> Result<(), MetricsError>;
}

/// Writes each batch as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl MetricsSink for LogSink {
    async fn export(&self, batch: &[MetricRecord]) -> Result<(), MetricsError> {
        info!(records = batch.len(), "Exporting metrics batch");
        for record in batch {
            debug!(
                name = %record.name,
                value = record.value,
                unit = %record.unit,
                timestamp = record.timestamp,
                dimensions = ?record.dimensions,
                "metric"
            );
        }
        Ok(())
    }
}

/// Replays each batch into the `metrics` facade under a name prefix.
///
/// `Count` records become counters; everything else a histogram.
#[derive(Debug, Clone)]
pub struct RecorderSink {
    prefix: String,
}

impl RecorderSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, record: &MetricRecord) -> String {
        let name = record.name.replace(['.', '-'], "_");
        if self.prefix.is_empty() {
            name
        } else {
            format!("{}_{}", self.prefix, name)
        }
    }
}

#[async_trait]
impl MetricsSink for RecorderSink {
    async fn export(&self, batch: &[MetricRecord]) -> Result<(), MetricsError> {
        for record in batch {
            let labels: Vec<::metrics::Label> = record
                .dimensions
                .iter()
                .map(|(k, v)| ::metrics::Label::new(k.clone(), v.clone()))
                .collect();
            let name = self.metric_name(record);

            match record.unit {
                MetricUnit::Count => {
                    ::metrics::counter!(name, labels).increment(record.value.max(0.0) as u64)
                }
                _ => ::metrics::histogram!(name, labels).record(record.value),
            }
        }
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl MetricsSink for NoopSink {
    async fn export(&self, _batch: &[MetricRecord]) -> Result<(), MetricsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::collector::dimensions;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn record(name: &str, value: f64, unit: MetricUnit) -> MetricRecord {
        MetricRecord {
            name: name.to_string(),
            value,
            unit,
            timestamp: 0,
            dimensions: dimensions(&[("provider", "local")]),
        }
    }

    #[test]
    fn test_metric_name_is_sanitized_and_prefixed() {
        let sink = RecorderSink::new("app");
        assert_eq!(
            sink.metric_name(&record("get_record.latency", 1.0, MetricUnit::Milliseconds)),
            "app_get_record_latency"
        );
        assert_eq!(
            RecorderSink::new("").metric_name(&record("deadline-exceeded", 1.0, MetricUnit::Count)),
            "deadline_exceeded"
        );
    }

    #[test]
    fn test_recorder_sink_emits_counters_and_histograms() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let sink = RecorderSink::new("bridge");
        let batch = vec![
            record("get_record.success", 1.0, MetricUnit::Count),
            record("get_record.latency", 12.5, MetricUnit::Milliseconds),
        ];

        // Local recorders are thread-scoped, so drive the export on this thread
        ::metrics::with_local_recorder(&recorder, || {
            futures::executor::block_on(sink.export(&batch)).unwrap();
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let counter = snapshot
            .iter()
            .find(|(k, ..)| k.key().name() == "bridge_get_record_success")
            .map(|(.., v)| v.clone());
        let histogram = snapshot
            .iter()
            .find(|(k, ..)| k.key().name() == "bridge_get_record_latency")
            .map(|(.., v)| v.clone());

        assert!(matches!(counter, Some(DebugValue::Counter(1))));
        assert!(matches!(histogram, Some(DebugValue::Histogram(ref v)) if v.len() == 1));
    }

    #[tokio::test]
    async fn test_log_and_noop_sinks_accept_batches() {
        let batch = vec![record("x", 1.0, MetricUnit::Count)];
        LogSink.export(&batch).await.unwrap();
        NoopSink.export(&batch).await.unwrap();
    }
}
