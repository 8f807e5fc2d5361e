// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared resilience state handed to providers at construction.
//!
//! One runtime is normally shared by every provider in a process so that
//! breakers, cache entries and metrics accumulate in one place. Tests build
//! a fresh runtime each to keep state isolated.
//!
//! Building a runtime inside a Tokio runtime also starts the collector's
//! background flusher. It runs until [`ProviderRuntime::shutdown`] is called
//! or the last clone of the runtime is dropped, and flushes once more on the
//! way out.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::TwoTierCache;
use crate::config::BridgeConfig;
use crate::metrics::{FlusherHandle, LogSink, MetricsCollector, MetricsError, MetricsSink};
use crate::resilience::{CircuitRegistry, RetryConfig};

/// Owns the background flusher and stops it when dropped.
struct FlushTask {
    handle: Mutex<Option<FlusherHandle>>,
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.stop();
        }
    }
}

#[derive(Clone)]
pub struct ProviderRuntime {
    pub breakers: Arc<CircuitRegistry>,
    pub cache: Arc<TwoTierCache>,
    pub metrics: Arc<MetricsCollector>,
    pub retry: RetryConfig,
    flusher: Option<Arc<FlushTask>>,
}

impl ProviderRuntime {
    pub fn new(
        breakers: Arc<CircuitRegistry>,
        cache: Arc<TwoTierCache>,
        metrics: Arc<MetricsCollector>,
        retry: RetryConfig,
    ) -> Self {
        let flusher = start_flusher(&metrics);
        Self {
            breakers,
            cache,
            metrics,
            retry,
            flusher,
        }
    }

    /// Build everything from config, connecting the shared cache tier if one
    /// is configured.
    pub async fn from_config(config: &BridgeConfig, sink: Arc<dyn MetricsSink>) -> Self {
        let cache = TwoTierCache::connect(&config.cache).await;
        info!(
            shared_tier = cache.has_shared_tier(),
            failure_threshold = config.circuit.failure_threshold,
            max_retries = config.retry.max_retries,
            "Provider runtime ready"
        );
        Self::new(
            Arc::new(CircuitRegistry::new(config.circuit.clone())),
            Arc::new(cache),
            Arc::new(MetricsCollector::new(config.metrics.clone(), sink)),
            config.retry.clone(),
        )
    }

    /// In-process runtime: local-only cache, metrics exported to the log.
    pub fn in_process(config: &BridgeConfig) -> Self {
        Self::new(
            Arc::new(CircuitRegistry::new(config.circuit.clone())),
            Arc::new(TwoTierCache::local_only(&config.cache)),
            Arc::new(MetricsCollector::new(config.metrics.clone(), Arc::new(LogSink))),
            config.retry.clone(),
        )
    }

    /// Whether a background flusher is exporting this runtime's metrics.
    #[must_use]
    pub fn has_flusher(&self) -> bool {
        self.flusher
            .as_ref()
            .is_some_and(|task| task.handle.lock().is_some())
    }

    /// Stop the background flusher and export whatever is still buffered.
    ///
    /// Returns how many records the last flush exported.
    pub async fn shutdown(&self) -> Result<usize, MetricsError> {
        let handle = self.flusher.as_ref().and_then(|task| task.handle.lock().take());
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        self.metrics.shutdown().await
    }
}

/// Spawn the collector's flusher if there is a Tokio runtime to spawn on.
fn start_flusher(metrics: &Arc<MetricsCollector>) -> Option<Arc<FlushTask>> {
    if tokio::runtime::Handle::try_current().is_err() {
        debug!("No Tokio runtime, metrics flusher not started");
        return None;
    }
    let handle = metrics.spawn_flusher(CancellationToken::new());
    Some(Arc::new(FlushTask {
        handle: Mutex::new(Some(handle)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Dimensions, MetricRecord, NoopSink};
    use crate::provider::traits::DataProvider;
    use crate::provider::{LocalBackend, ResilientProvider};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSink {
        exported: AtomicUsize,
    }

    impl CountingSink {
        fn exported(&self) -> usize {
            self.exported.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetricsSink for CountingSink {
        async fn export(&self, batch: &[MetricRecord]) -> Result<(), MetricsError> {
            self.exported.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_for_exports(sink: &CountingSink, at_least: usize) {
        for _ in 0..100 {
            if sink.exported() >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_from_config_without_redis_is_local_only() {
        let runtime = ProviderRuntime::from_config(&BridgeConfig::default(), Arc::new(NoopSink)).await;
        assert!(!runtime.cache.has_shared_tier());
        assert!(runtime.breakers.is_empty());
        assert_eq!(runtime.retry.max_retries, 3);
        assert!(runtime.has_flusher());
    }

    #[test]
    fn test_clones_share_state() {
        let runtime = ProviderRuntime::in_process(&BridgeConfig::default());
        let clone = runtime.clone();

        clone.breakers.breaker("local", "get_record");
        assert_eq!(runtime.breakers.len(), 1);
        // No Tokio runtime here, so nothing to flush on
        assert!(!runtime.has_flusher());
    }

    #[tokio::test]
    async fn test_provider_metrics_are_exported_in_background() {
        let sink = Arc::new(CountingSink::default());
        let runtime = ProviderRuntime::from_config(&BridgeConfig::default(), sink.clone()).await;
        let provider = ResilientProvider::new(LocalBackend::default(), runtime.clone());

        for i in 0..200 {
            provider
                .create_record("events", Some(format!("e{}", i).as_str()), json!({ "n": i }))
                .await
                .unwrap();
        }

        // A success and a latency record per call; flushes trigger every 100
        wait_for_exports(&sink, 300).await;
        assert!(sink.exported() >= 300, "only {} exported", sink.exported());
        assert!(runtime.metrics.buffered() < 100);

        runtime.shutdown().await.unwrap();
        assert_eq!(sink.exported(), 400);
        assert_eq!(runtime.metrics.buffered(), 0);
        assert!(!runtime.has_flusher());
    }

    #[tokio::test]
    async fn test_dropping_last_clone_flushes_remaining_records() {
        let sink = Arc::new(CountingSink::default());
        let runtime = ProviderRuntime::from_config(&BridgeConfig::default(), sink.clone()).await;
        let clone = runtime.clone();

        runtime.metrics.record_success("get_record", Dimensions::new());
        drop(runtime);
        // Still one clone alive
        tokio::task::yield_now().await;
        assert_eq!(sink.exported(), 0);

        drop(clone);
        wait_for_exports(&sink, 1).await;
        assert_eq!(sink.exported(), 1);
    }
}
