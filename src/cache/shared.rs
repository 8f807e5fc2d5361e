// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared cache tier.
//!
//! Entries here expire by TTL only. Two implementations:
//! - [`RedisSharedTier`]: shared between processes, keys namespaced by prefix
//! - [`InMemorySharedTier`]: single-process stand-in for local/offline mode and tests

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::{pipe, AsyncCommands, Client};
use std::time::Duration;
use tokio::time::Instant;

use super::CacheError;
use crate::resilience::retry::{retry, RetryConfig};

/// A shared-tier hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedEntry {
    pub value: Vec<u8>,
    /// Time left before the shared tier drops the entry, when known
    pub ttl_remaining: Option<Duration>,
}

#[async_trait]
pub trait SharedCacheTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SharedEntry>, CacheError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix`; returns how many were deleted.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Delete everything this tier owns.
    async fn clear(&self) -> Result<(), CacheError> {
        self.delete_prefix("").await.map(|_| ())
    }

    /// Short label for logs and metrics.
    fn name(&self) -> &'static str;
}

pub struct InMemorySharedTier {
    data: DashMap<String, (Vec<u8>, Instant)>,
}

impl InMemorySharedTier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current entry count (expired entries included until touched)
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for InMemorySharedTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCacheTier for InMemorySharedTier {
    async fn get(&self, key: &str) -> Result<Option<SharedEntry>, CacheError> {
        let now = Instant::now();
        let hit = self.data.get(key).map(|r| {
            let (value, expires_at) = r.value();
            (value.clone(), *expires_at)
        });

        match hit {
            Some((value, expires_at)) if expires_at > now => Ok(Some(SharedEntry {
                value,
                ttl_remaining: Some(expires_at - now),
            })),
            Some(_) => {
                self.data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.data
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.data.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let before = self.data.len();
        self.data.retain(|k, _| !k.starts_with(prefix));
        Ok(before - self.data.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed shared tier.
pub struct RedisSharedTier {
    connection: ConnectionManager,
    /// Namespace for every key (e.g., "bridge:cache:" → "bridge:cache:get_record:users:…")
    prefix: String,
}

impl RedisSharedTier {
    /// Connect with startup retry: fail fast on a bad URL, tolerate a slow start.
    pub async fn connect(connection_string: &str, prefix: &str) -> Result<Self, CacheError> {
        let client = Client::open(connection_string)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let client = &client;
        let connection = retry("redis_connect", &RetryConfig::startup(), || async move {
            ConnectionManager::new(client.clone())
                .await
                .map_err(|e| CacheError::Unavailable(e.to_string()))
        })
        .await?;

        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Escape glob metacharacters so a literal prefix can be used in `SCAN MATCH`.
fn escape_glob(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[async_trait]
impl SharedCacheTier for RedisSharedTier {
    async fn get(&self, key: &str) -> Result<Option<SharedEntry>, CacheError> {
        let mut conn = self.connection.clone();
        let key = self.prefixed_key(key);

        let (value, pttl): (Option<Vec<u8>>, i64) = pipe()
            .get(&key)
            .pttl(&key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(value.map(|value| SharedEntry {
            value,
            // -1 = no expiry, -2 = gone between the two commands
            ttl_remaining: (pttl > 0).then(|| Duration::from_millis(pttl as u64)),
        }))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let millis = ttl.as_millis().max(1) as u64;

        let _: () = redis::cmd("SET")
            .arg(self.prefixed_key(key))
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(self.prefixed_key(key)).await.map_err(unavailable)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", escape_glob(&self.prefixed_key(prefix)));

        // SCAN instead of KEYS to avoid blocking Redis
        let mut deleted = 0usize;
        let mut cursor = 0u64;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;

            if !batch.is_empty() {
                let removed: usize = conn.del(&batch).await.map_err(unavailable)?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let tier = InMemorySharedTier::new();
        tier.set("k", b"v", Duration::from_secs(60)).await.unwrap();

        let hit = tier.get("k").await.unwrap().unwrap();
        assert_eq!(hit.value, b"v".to_vec());
        assert!(hit.ttl_remaining.unwrap() <= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let tier = InMemorySharedTier::new();
        tier.set("k", b"v", Duration::from_secs(2)).await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(tier.get("k").await.unwrap().is_none());
        assert!(tier.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_extend_ttl() {
        let tier = InMemorySharedTier::new();
        tier.set("k", b"v", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(tier.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let tier = InMemorySharedTier::new();
        let ttl = Duration::from_secs(60);
        tier.set("query:users:1", b"a", ttl).await.unwrap();
        tier.set("query:users:2", b"b", ttl).await.unwrap();
        tier.set("get:users:1", b"c", ttl).await.unwrap();

        assert_eq!(tier.delete_prefix("query:users:").await.unwrap(), 2);
        assert!(tier.get("get:users:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_via_default_method() {
        let tier = InMemorySharedTier::new();
        tier.set("a", b"1", Duration::from_secs(60)).await.unwrap();
        tier.set("b", b"2", Duration::from_secs(60)).await.unwrap();

        tier.clear().await.unwrap();
        assert!(tier.is_empty());
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("bridge:cache:q*"), "bridge:cache:q\\*");
        assert_eq!(escape_glob("a[1]?"), "a\\[1\\]\\?");
        assert_eq!(escape_glob("plain:key"), "plain:key");
    }
}
