// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local (in-process) cache tier.
//!
//! Bounded by a total byte budget with least-recently-used eviction. TTL is
//! sliding: a read or existence check refreshes both recency and the TTL
//! window of the entry it touches.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct LocalEntry {
    value: Vec<u8>,
    touched_at: Instant,
    ttl: Duration,
    size_bytes: usize,
    /// Position in the recency index
    tick: u64,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.touched_at) >= self.ttl
    }
}

#[derive(Debug, Default)]
struct LocalState {
    entries: HashMap<String, LocalEntry>,
    /// tick → key, oldest first
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    total_bytes: usize,
}

impl LocalState {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<LocalEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// Refresh recency and the sliding TTL of a live entry.
    fn touch(&mut self, key: &str, now: Instant) -> bool {
        let tick = self.bump();
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.is_expired(now) {
            self.remove(key);
            return false;
        }
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        entry.touched_at = now;
        self.recency.remove(&old_tick);
        self.recency.insert(tick, key.to_string());
        true
    }
}

/// Byte-budgeted LRU tier.
pub struct LocalTier {
    max_bytes: usize,
    state: Mutex<LocalState>,
}

impl LocalTier {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(LocalState::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        if !state.touch(key, Instant::now()) {
            return None;
        }
        state.entries.get(key).map(|e| e.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().touch(key, Instant::now())
    }

    /// Insert or replace. Values larger than the whole budget are not stored.
    pub fn insert(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        let size_bytes = key.len() + value.len();
        if size_bytes > self.max_bytes {
            debug!(key, size_bytes, budget = self.max_bytes, "Value exceeds local cache budget");
            return false;
        }

        let mut state = self.state.lock();
        state.remove(key);

        let mut evicted = 0usize;
        while state.total_bytes + size_bytes > self.max_bytes {
            let Some((_, oldest)) = state.recency.pop_first() else {
                break;
            };
            if let Some(entry) = state.entries.remove(&oldest) {
                state.total_bytes -= entry.size_bytes;
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, "Evicted least-recently-used local cache entries");
            crate::metrics::record_cache_eviction("local", evicted);
        }

        let tick = state.bump();
        state.recency.insert(tick, key.to_string());
        state.total_bytes += size_bytes;
        state.entries.insert(
            key.to_string(),
            LocalEntry {
                value,
                touched_at: Instant::now(),
                ttl,
                size_bytes,
                tick,
            },
        );
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every key starting with `prefix`; returns how many were removed.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = LocalState::default();
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_insert_and_get() {
        let tier = LocalTier::new(1024);
        tier.insert("a", b"hello".to_vec(), TTL);

        assert_eq!(tier.get("a"), Some(b"hello".to_vec()));
        assert_eq!(tier.total_bytes(), 1 + 5);
        assert!(tier.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_replace_accounts_bytes_once() {
        let tier = LocalTier::new(1024);
        tier.insert("a", vec![0; 10], TTL);
        tier.insert("a", vec![0; 20], TTL);

        assert_eq!(tier.len(), 1);
        assert_eq!(tier.total_bytes(), 21);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        // Each entry is 1 + 9 = 10 bytes; room for three
        let tier = LocalTier::new(30);
        tier.insert("a", vec![0; 9], TTL);
        tier.insert("b", vec![0; 9], TTL);
        tier.insert("c", vec![0; 9], TTL);

        // Touch "a" so "b" becomes the oldest
        assert!(tier.get("a").is_some());
        tier.insert("d", vec![0; 9], TTL);

        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert!(tier.contains("c"));
        assert!(tier.contains("d"));
        assert!(tier.total_bytes() <= 30);
    }

    #[tokio::test]
    async fn test_oversized_value_not_stored() {
        let tier = LocalTier::new(16);
        assert!(!tier.insert("big", vec![0; 64], TTL));
        assert!(tier.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let tier = LocalTier::new(1024);
        tier.insert("a", b"v".to_vec(), Duration::from_secs(1));

        tokio::time::advance(Duration::from_millis(1001)).await;

        assert!(tier.get("a").is_none());
        assert_eq!(tier.total_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_slides_ttl_window() {
        let tier = LocalTier::new(1024);
        tier.insert("a", b"v".to_vec(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(tier.contains("a"));
        tokio::time::advance(Duration::from_secs(8)).await;

        // 16s since insert, 8s since last touch
        assert!(tier.get("a").is_some());
    }

    #[tokio::test]
    async fn test_remove_prefix() {
        let tier = LocalTier::new(1024);
        tier.insert("query:users:1", b"x".to_vec(), TTL);
        tier.insert("query:users:2", b"x".to_vec(), TTL);
        tier.insert("query:orders:1", b"x".to_vec(), TTL);

        assert_eq!(tier.remove_prefix("query:users:"), 2);
        assert_eq!(tier.len(), 1);
        assert!(tier.contains("query:orders:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let tier = LocalTier::new(1024);
        tier.insert("short", b"x".to_vec(), Duration::from_secs(1));
        tier.insert("long", b"x".to_vec(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(tier.purge_expired(), 1);
        assert_eq!(tier.len(), 1);
    }
}
