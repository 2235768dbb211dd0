//! # In-Memory Cache Store
//!
//! Process-local cache tier: TTL per entry with millisecond precision, a
//! periodic sweep of expired entries, LRU eviction when the entry or memory
//! budget is exhausted, and pattern deletion by enumerating keys (there is no
//! native pattern scan in-process).

use super::{CacheEntry, CacheStore, CacheStoreStats};
use crate::caching::{CacheError, CacheResult, KeyPattern};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info};

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,

    /// Maximum memory usage in bytes
    pub max_memory_bytes: usize,

    /// Interval of the background sweep for expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Evict least-recently-used entries when full; when false a full cache
    /// rejects new keys
    pub enable_lru: bool,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_memory_bytes: 100 * 1024 * 1024, // 100MB
            cleanup_interval: Duration::from_secs(60),
            enable_lru: true,
        }
    }
}

/// Entry plus its position in the recency order
struct Slot {
    entry: CacheEntry,
    tick: u64,
}

/// In-memory cache implementation
pub struct InMemoryCache {
    config: InMemoryCacheConfig,

    entries: Arc<DashMap<String, Slot>>,

    /// Logical clock for LRU ordering
    clock: AtomicU64,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_cleanups: Arc<AtomicU64>,

    /// Current memory usage estimate
    memory_usage: Arc<AtomicUsize>,

    cleanup_task: tokio::task::JoinHandle<()>,
}

impl InMemoryCache {
    /// Create a new in-memory cache. Must be called inside a Tokio runtime
    /// because it starts the expiry sweep.
    pub fn new(config: InMemoryCacheConfig) -> CacheResult<Self> {
        if config.max_entries == 0 {
            return Err(CacheError::Configuration {
                message: "in-memory cache max_entries must be greater than zero".to_string(),
            });
        }
        if config.cleanup_interval.is_zero() {
            return Err(CacheError::Configuration {
                message: "in-memory cache cleanup_interval must be non-zero".to_string(),
            });
        }

        let entries: Arc<DashMap<String, Slot>> = Arc::new(DashMap::new());
        let expired_cleanups = Arc::new(AtomicU64::new(0));
        let memory_usage = Arc::new(AtomicUsize::new(0));

        let cleanup_task = {
            let entries = entries.clone();
            let expired_cleanups = expired_cleanups.clone();
            let memory_usage = memory_usage.clone();
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired_entries(&entries, &expired_cleanups, &memory_usage);
                }
            })
        };

        Ok(Self {
            config,
            entries,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_cleanups,
            memory_usage,
            cleanup_task,
        })
    }

    /// Number of live and not-yet-swept entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn cleanup_expired_entries(
        entries: &DashMap<String, Slot>,
        expired_cleanups: &AtomicU64,
        memory_usage: &AtomicUsize,
    ) -> usize {
        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|slot| slot.value().entry.is_expired())
            .map(|slot| slot.key().clone())
            .collect();

        let mut cleaned_count = 0;
        let mut freed_memory = 0;

        for key in expired_keys {
            if let Some((_, slot)) = entries.remove_if(&key, |_, slot| slot.entry.is_expired()) {
                freed_memory += slot.entry.size;
                cleaned_count += 1;
            }
        }

        if cleaned_count > 0 {
            memory_usage.fetch_sub(freed_memory, Ordering::Relaxed);
            expired_cleanups.fetch_add(cleaned_count as u64, Ordering::Relaxed);
            debug!("Cleaned up {} expired cache entries, freed {} bytes", cleaned_count, freed_memory);
        }
        cleaned_count
    }

    fn remove_entry(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, slot)) => {
                self.memory_usage.fetch_sub(slot.entry.size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Make room for one more key
    fn evict_if_needed(&self, incoming_size: usize) -> CacheResult<()> {
        let over_budget = |cache: &Self| {
            cache.entries.len() >= cache.config.max_entries
                || cache.memory_usage.load(Ordering::Relaxed) + incoming_size > cache.config.max_memory_bytes
        };

        if !over_budget(self) {
            return Ok(());
        }

        // Expired entries go first
        Self::cleanup_expired_entries(&self.entries, &self.expired_cleanups, &self.memory_usage);
        if !over_budget(self) {
            return Ok(());
        }

        if !self.config.enable_lru {
            return Err(CacheError::Store {
                message: "Cache is full and LRU eviction is disabled".to_string(),
            });
        }

        // Keep 90% of max entries
        let target = self.config.max_entries * 9 / 10;
        let evict_count = std::cmp::max(self.entries.len().saturating_sub(target), 1);
        self.evict_lru_entries(evict_count);

        Ok(())
    }

    fn evict_lru_entries(&self, count: usize) {
        let mut by_recency: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|slot| (slot.value().tick, slot.key().clone()))
            .collect();
        by_recency.sort_unstable();

        let mut evicted_count = 0;
        for (_, key) in by_recency.into_iter().take(count) {
            if self.remove_entry(&key) {
                evicted_count += 1;
            }
        }

        self.evictions.fetch_add(evicted_count as u64, Ordering::Relaxed);
        info!("Evicted {} LRU cache entries", evicted_count);
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        self.cleanup_task.abort();
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let tick = self.next_tick();
        let value = match self.entries.get_mut(key) {
            Some(mut slot) if !slot.entry.is_expired() => {
                slot.entry.mark_accessed();
                slot.tick = tick;
                Some(slot.entry.value.clone())
            }
            Some(slot) => {
                drop(slot);
                if let Some((_, expired)) = self.entries.remove_if(key, |_, s| s.entry.is_expired()) {
                    self.memory_usage.fetch_sub(expired.entry.size, Ordering::Relaxed);
                    self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
            None => None,
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry::new(value.to_vec(), ttl);
        let entry_size = entry.size;

        if !self.entries.contains_key(key) {
            self.evict_if_needed(entry_size)?;
        }

        let slot = Slot {
            entry,
            tick: self.next_tick(),
        };
        if let Some(old) = self.entries.insert(key.to_string(), slot) {
            self.memory_usage.fetch_sub(old.entry.size, Ordering::Relaxed);
        }
        self.memory_usage.fetch_add(entry_size, Ordering::Relaxed);

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.remove_entry(key))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .entries
            .get(key)
            .map(|slot| !slot.entry.is_expired())
            .unwrap_or(false))
    }

    async fn keys_matching(&self, pattern: &KeyPattern) -> CacheResult<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|slot| !slot.value().entry.is_expired() && pattern.matches(slot.key()))
            .map(|slot| slot.key().clone())
            .collect())
    }

    async fn delete_matching(&self, pattern: &KeyPattern) -> CacheResult<usize> {
        if let Some(key) = pattern.as_exact_key() {
            return Ok(usize::from(self.remove_entry(&key)));
        }

        // Expired keys are removed too but not counted
        let matched: Vec<(String, bool)> = self
            .entries
            .iter()
            .filter(|slot| pattern.matches(slot.key()))
            .map(|slot| (slot.key().clone(), !slot.value().entry.is_expired()))
            .collect();

        let mut deleted = 0;
        for (key, live) in matched {
            if self.remove_entry(&key) && live {
                deleted += 1;
            }
        }

        if deleted > 0 {
            debug!("Local cache: cleared {} keys matching {}", deleted, pattern);
        }
        Ok(deleted)
    }

    async fn clear(&self) -> CacheResult<()> {
        let entry_count = self.entries.len();
        self.entries.clear();
        self.memory_usage.store(0, Ordering::Relaxed);

        info!("Cleared {} entries from in-memory cache", entry_count);
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        Ok(CacheStoreStats {
            entries: self.entries.len(),
            memory_usage: self.memory_usage.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let test_key = "__health_check__";
        let test_value = b"health_check_value";

        self.set(test_key, test_value, Duration::from_secs(1)).await?;
        let retrieved = self.get(test_key).await?;
        self.delete(test_key).await?;

        Ok(retrieved.as_deref() == Some(&test_value[..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn cache() -> InMemoryCache {
        InMemoryCache::new(InMemoryCacheConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = cache();

        cache.set("news:slug:a", b"article", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("news:slug:a").await.unwrap(), Some(b"article".to_vec()));
        assert!(cache.exists("news:slug:a").await.unwrap());

        assert!(cache.delete("news:slug:a").await.unwrap());
        assert!(!cache.exists("news:slug:a").await.unwrap());
        assert!(!cache.delete("news:slug:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = cache();

        cache.set("dashboard:stats", b"{}", Duration::from_millis(100)).await.unwrap();
        assert!(cache.exists("dashboard:stats").await.unwrap());

        sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get("dashboard:stats").await.unwrap(), None);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.expired_cleanups, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_background_sweep_removes_expired() {
        let cache = InMemoryCache::new(InMemoryCacheConfig {
            cleanup_interval: Duration::from_millis(20),
            ..Default::default()
        })
        .unwrap();

        cache.set("k", b"v", Duration::from_millis(10)).await.unwrap();
        sleep(Duration::from_millis(80)).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = InMemoryCache::new(InMemoryCacheConfig {
            max_entries: 3,
            ..Default::default()
        })
        .unwrap();

        for i in 0..3 {
            let key = format!("key_{}", i);
            cache.set(&key, b"v", Duration::from_secs(60)).await.unwrap();
        }

        // key_0 becomes the most recently used
        cache.get("key_0").await.unwrap();
        cache.set("key_3", b"v", Duration::from_secs(60)).await.unwrap();

        assert!(!cache.exists("key_1").await.unwrap());
        assert!(cache.exists("key_0").await.unwrap());
        assert!(cache.exists("key_2").await.unwrap());
        assert!(cache.exists("key_3").await.unwrap());
        assert_eq!(cache.stats().await.unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn test_full_cache_without_lru_rejects() {
        let cache = InMemoryCache::new(InMemoryCacheConfig {
            max_entries: 1,
            enable_lru: false,
            ..Default::default()
        })
        .unwrap();

        cache.set("a", b"1", Duration::from_secs(60)).await.unwrap();
        assert!(cache.set("b", b"2", Duration::from_secs(60)).await.is_err());
        // Overwriting an existing key never needs room
        cache.set("a", b"3", Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test]
    async fn test_pattern_operations() {
        let cache = cache();
        let ttl = Duration::from_secs(60);
        cache.set("colleges:page=1", b"1", ttl).await.unwrap();
        cache.set("colleges:page=2", b"2", ttl).await.unwrap();
        cache.set("college:slug:iit-delhi", b"3", ttl).await.unwrap();

        let mut keys = cache.keys_matching(&KeyPattern::new("colleges:*")).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["colleges:page=1", "colleges:page=2"]);

        let deleted = cache.delete_matching(&KeyPattern::new("colleges:*")).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(cache.exists("college:slug:iit-delhi").await.unwrap());

        let exact = KeyPattern::new("college:slug:{key}").resolve(Some("iit-delhi"));
        assert_eq!(cache.delete_matching(&exact).await.unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = cache();

        cache.set("key1", b"value1", Duration::from_secs(60)).await.unwrap();
        cache.get("key1").await.unwrap();
        cache.get("key2").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!(stats.memory_usage > 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert!(cache().health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_zero_capacity() {
        let result = InMemoryCache::new(InMemoryCacheConfig {
            max_entries: 0,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
