//! # Cache Stores Module
//!
//! The two cache tiers: an in-memory local store and a Redis-backed shared
//! store. Both implement [`CacheStore`], which is the seam the cache manager
//! and the invalidation coordinator are written against.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::{CacheResult, KeyPattern};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cache entry with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value (whole serialized object)
    pub value: Vec<u8>,

    /// When the entry was created (Unix millis)
    pub created_at: u64,

    /// When the entry expires (Unix millis)
    pub expires_at: u64,

    /// Number of times this entry has been read
    pub access_count: u64,

    /// Last access timestamp (Unix millis)
    pub last_accessed: u64,

    /// Size of the entry in bytes
    pub size: usize,
}

impl CacheEntry {
    /// Create a new cache entry expiring `ttl` from now
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let now = now_millis();
        let size = value.len() + std::mem::size_of::<Self>();

        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
            access_count: 0,
            last_accessed: now,
            size,
        }
    }

    /// Check if the entry is expired
    pub fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }

    /// Mark the entry as accessed
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = now_millis();
    }

    /// Remaining time to live
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now_millis()))
    }
}

/// Trait for cache tier implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short tier name used in logs and metrics ("local", "shared")
    fn name(&self) -> &'static str;

    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete a value from the cache
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check if a key exists in the cache
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// List live keys matching a pattern
    async fn keys_matching(&self, pattern: &KeyPattern) -> CacheResult<Vec<String>>;

    /// Delete every key matching a pattern, returning how many were removed
    async fn delete_matching(&self, pattern: &KeyPattern) -> CacheResult<usize>;

    /// Clear all entries from the cache
    async fn clear(&self) -> CacheResult<()>;

    /// Get cache statistics
    async fn stats(&self) -> CacheResult<CacheStoreStats>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;
}

/// Cache store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStoreStats {
    /// Number of entries
    pub entries: usize,

    /// Total memory usage in bytes
    pub memory_usage: usize,

    /// Number of hits
    pub hits: u64,

    /// Number of misses
    pub misses: u64,

    /// Number of evictions
    pub evictions: u64,

    /// Number of expired entries cleaned up
    pub expired_cleanups: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry_uses_millisecond_precision() {
        let entry = CacheEntry::new(b"v".to_vec(), Duration::from_millis(50));
        assert!(!entry.is_expired());
        assert!(entry.ttl() <= Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(60));
        assert!(entry.is_expired());
        assert_eq!(entry.ttl(), Duration::ZERO);
    }

    #[test]
    fn test_mark_accessed() {
        let mut entry = CacheEntry::new(b"v".to_vec(), Duration::from_secs(1));
        entry.mark_accessed();
        entry.mark_accessed();
        assert_eq!(entry.access_count, 2);
        assert!(entry.size > 1);
    }
}
