// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The two-tier cache facade.
//!
//! Shared-tier errors never reach the caller: reads degrade to a miss and
//! writes keep the local copy, both logged at `warn!`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::keys::wildcard_prefix;
use super::local::LocalTier;
use super::shared::{RedisSharedTier, SharedCacheTier};
use super::{CacheConfig, CacheError, Environment};

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub misses: u64,
    pub shared_errors: u64,
    pub local_entries: usize,
    pub local_bytes: usize,
    pub local_max_bytes: usize,
    /// Name of the shared tier, `None` when running local-only
    pub shared_tier: Option<&'static str>,
}

impl CacheStats {
    /// Fraction of lookups served by either tier.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.shared_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    shared_errors: AtomicU64,
}

pub struct TwoTierCache {
    local: LocalTier,
    shared: Option<Arc<dyn SharedCacheTier>>,
    default_ttl: Duration,
    environment: Environment,
    counters: Counters,
}

impl TwoTierCache {
    pub fn new(config: &CacheConfig, shared: Arc<dyn SharedCacheTier>) -> Self {
        Self::build(config, Some(shared))
    }

    /// A cache with no shared tier; every local miss is a miss.
    pub fn local_only(config: &CacheConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: &CacheConfig, shared: Option<Arc<dyn SharedCacheTier>>) -> Self {
        Self {
            local: LocalTier::new(config.local_max_bytes),
            shared,
            default_ttl: config.default_ttl,
            environment: config.environment,
            counters: Counters::default(),
        }
    }

    /// Build from config, connecting to Redis when a URL is given.
    ///
    /// A shared tier that cannot be reached at startup is not fatal: the
    /// cache runs local-only and says so in the log.
    pub async fn connect(config: &CacheConfig) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            info!("No shared cache tier configured, running local-only");
            return Self::local_only(config);
        };

        match RedisSharedTier::connect(url, &config.key_prefix).await {
            Ok(tier) => {
                info!(prefix = %config.key_prefix, "Connected shared cache tier");
                Self::new(config, Arc::new(tier))
            }
            Err(e) => {
                warn!(error = %e, "Shared cache tier unreachable, running local-only");
                crate::metrics::record_cache_error("redis", "connect");
                Self::local_only(config)
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(value) = self.local.get(key) {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_lookup("local", "hit");
            return Some(value);
        }
        crate::metrics::record_cache_lookup("local", "miss");

        let Some(shared) = &self.shared else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match shared.get(key).await {
            Ok(Some(entry)) => {
                self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_lookup(shared.name(), "hit");
                let ttl = entry.ttl_remaining.unwrap_or(self.default_ttl);
                self.local.insert(key, entry.value.clone(), ttl);
                Some(entry.value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_lookup(shared.name(), "miss");
                None
            }
            Err(e) => {
                self.shared_failed(shared.name(), "get", key, &e);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Decode a cached JSON value. An entry that no longer decodes is dropped.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Dropping undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Store in the local tier, then best-effort in the shared tier.
    ///
    /// `ttl` of `None` uses the configured default.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);

        match &self.shared {
            Some(shared) => {
                self.local.insert(key, value.clone(), ttl);
                if let Err(e) = shared.set(key, &value, ttl).await {
                    self.shared_failed(shared.name(), "set", key, &e);
                }
            }
            None => {
                self.local.insert(key, value, ttl);
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set(key, bytes, ttl).await;
        Ok(())
    }

    /// Existence check. A local hit refreshes recency and the sliding TTL.
    pub async fn contains(&self, key: &str) -> bool {
        if self.local.contains(key) {
            return true;
        }
        let Some(shared) = &self.shared else {
            return false;
        };
        match shared.get(key).await {
            Ok(Some(entry)) => {
                let ttl = entry.ttl_remaining.unwrap_or(self.default_ttl);
                self.local.insert(key, entry.value, ttl);
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.shared_failed(shared.name(), "contains", key, &e);
                false
            }
        }
    }

    /// Delete one key, or every key under a wildcard (`"query:users:*"`).
    pub async fn delete(&self, key: &str) {
        if let Some(prefix) = wildcard_prefix(key) {
            self.invalidate_prefix(prefix).await;
            return;
        }

        self.local.remove(key);
        if let Some(shared) = &self.shared {
            if let Err(e) = shared.delete(key).await {
                self.shared_failed(shared.name(), "delete", key, &e);
            }
        }
    }

    /// Drop every entry whose key starts with `prefix`, in both tiers.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let local_removed = self.local.remove_prefix(prefix);

        let shared_removed = match &self.shared {
            Some(shared) => match shared.delete_prefix(prefix).await {
                Ok(n) => n,
                Err(e) => {
                    self.shared_failed(shared.name(), "invalidate", prefix, &e);
                    0
                }
            },
            None => 0,
        };

        debug!(prefix, local_removed, shared_removed, "Invalidated cache prefix");
    }

    /// Empty both tiers. Refused in production.
    pub async fn clear(&self) -> Result<(), CacheError> {
        if self.environment == Environment::Production {
            warn!("Refusing to clear cache in production");
            return Err(CacheError::ClearForbidden);
        }

        self.local.clear();
        if let Some(shared) = &self.shared {
            if let Err(e) = shared.clear().await {
                self.shared_failed(shared.name(), "clear", "*", &e);
            }
        }
        info!("Cache cleared");
        Ok(())
    }

    /// Drop expired local entries; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.local.purge_expired()
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[must_use]
    pub fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let local_bytes = self.local.total_bytes();
        crate::metrics::set_local_cache_bytes(local_bytes);

        CacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            shared_errors: self.counters.shared_errors.load(Ordering::Relaxed),
            local_entries: self.local.len(),
            local_bytes,
            local_max_bytes: self.local.max_bytes(),
            shared_tier: self.shared.as_ref().map(|s| s.name()),
        }
    }

    fn shared_failed(&self, tier: &'static str, operation: &'static str, key: &str, err: &CacheError) {
        self.counters.shared_errors.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_error(tier, operation);
        warn!(tier, operation, key, error = %err, "Shared cache tier error, degrading");
    }
}
