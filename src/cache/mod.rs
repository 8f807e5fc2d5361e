// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two-tier cache: a bounded in-process tier in front of a shared tier.
//!
//! ```text
//! get(key)
//!   │
//!   ├─► local tier (LRU, byte budget, sliding TTL) ── hit ──► value
//!   │
//!   └─► shared tier (Redis or in-memory, fixed TTL)
//!         ├─ hit ──► backfill local ──► value
//!         └─ miss / unavailable ──► None
//! ```
//!
//! The local tier is only ever a cache *of* shared-tier data and never the
//! authority. Shared-tier failures degrade to misses and are logged.
//!
//! There is no single-flight protection: concurrent misses for the same key
//! each run the upstream fetch, and concurrent writes are last-write-wins.

pub mod keys;
pub mod local;
pub mod shared;
pub mod tiered;

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub use local::LocalTier;
pub use shared::{InMemorySharedTier, RedisSharedTier, SharedCacheTier, SharedEntry};
pub use tiered::{CacheStats, TwoTierCache};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache tier unavailable: {0}")]
    Unavailable(String),
    #[error("cache value could not be encoded: {0}")]
    Serialization(String),
    #[error("clearing the cache is not allowed in production")]
    ClearForbidden,
}

impl crate::resilience::RetryableError for CacheError {
    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Unavailable(_) => Some("unavailable"),
            Self::Serialization(_) => Some("invalid-argument"),
            Self::ClearForbidden => Some("permission-denied"),
        }
    }
}

/// Deployment environment; destructive cache operations are refused in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

/// Configuration for the two-tier cache
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Local tier budget in serialized bytes (default: 100 MB)
    #[serde(default = "default_local_max_bytes")]
    pub local_max_bytes: usize,

    /// TTL used when a caller does not give one
    #[serde(
        rename = "default_ttl_ms",
        default = "default_ttl",
        with = "crate::config::serde_millis"
    )]
    pub default_ttl: Duration,

    /// Shared tier connection string (e.g., "redis://localhost:6379").
    /// `None` keeps the cache in-process only.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace prepended to every shared-tier key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default)]
    pub environment: Environment,
}

fn default_local_max_bytes() -> usize { 100 * 1024 * 1024 } // 100 MB
fn default_ttl() -> Duration { Duration::from_secs(300) }
fn default_key_prefix() -> String { "bridge:cache:".to_string() }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_max_bytes: default_local_max_bytes(),
            default_ttl: default_ttl(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            environment: Environment::default(),
        }
    }
}
