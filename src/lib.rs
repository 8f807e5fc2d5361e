// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Backend Bridge
//!
//! Run one project against interchangeable backends (a document-oriented
//! serverless platform, a broad IaaS cloud, or a local offline mode) with
//! uniform failure semantics, and move it between them when needed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Caller                             │
//! │  • Invokes a provider contract operation (get record, ...)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ResilientProvider                        │
//! │  • Two-tier cache lookup for reads (local LRU → Redis)      │
//! │  • Per-operation circuit breaker (fast-fail when open)      │
//! │  • Retry with exponential backoff + jitter (transient only) │
//! │  • Metrics event for every attempt                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  BackendProvider impl                       │
//! │  • auth / data / storage / realtime / functions /           │
//! │    notifications / deployment                               │
//! │  • LocalBackend ships in-crate                              │
//! └─────────────────────────────────────────────────────────────┘
//!
//!          Out of band (operator flows, not the hot path):
//!
//!   ProviderAdvisor ── scores capability profiles against requirements
//!   MigrationPlanner ─ ordered steps, risks, rollback recipe
//!   MigrationExecutor  users / data / files between two live providers
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use backend_bridge::{BridgeConfig, ProviderRuntime, ResilientProvider};
//! use backend_bridge::provider::{DataProvider, LocalBackend};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BridgeConfig::default();
//!     let runtime = ProviderRuntime::in_process(&config);
//!     let provider = ResilientProvider::new(LocalBackend::default(), runtime);
//!
//!     provider
//!         .create_record("patients", Some("12345"), json!({"name": "John Doe"}))
//!         .await
//!         .expect("create failed");
//!
//!     // Second read is served from cache
//!     let record = provider.get_record("patients", "12345").await.unwrap();
//!     println!("Found: {:?}", record.map(|r| r.data));
//! }
//! ```
//!
//! ## Modules
//!
//! - [`provider`]: the backend contract, [`LocalBackend`](provider::LocalBackend) and the resilient pipeline
//! - [`resilience`]: circuit breakers and retry with backoff
//! - [`cache`]: two-tier (local + shared) cache
//! - [`metrics`]: buffered metrics collector and `metrics` facade helpers
//! - [`advisor`]: capability-based backend recommendation
//! - [`migration`]: migration planning and execution
//! - [`config`]: [`BridgeConfig`]

pub mod advisor;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod migration;
pub mod provider;
pub mod resilience;

pub use advisor::{ProjectRequirements, ProviderAdvisor, Recommendation};
pub use cache::{CacheConfig, CacheError, TwoTierCache};
pub use config::{BridgeConfig, ConfigError};
pub use metrics::{MetricsCollector, MetricsConfig, MetricsSink};
pub use migration::{MigrationExecutor, MigrationOptions, MigrationPlan, MigrationPlanner, MigrationResult};
pub use provider::{BackendKind, BackendProvider, ProviderError, ProviderRuntime, ResilientProvider};
pub use resilience::{CircuitBreaker, CircuitConfig, CircuitError, CircuitRegistry, RetryConfig};
