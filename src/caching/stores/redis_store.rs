//! # Redis Cache Store
//!
//! Shared cache tier backed by Redis. All keys live under a configurable
//! prefix so several deployments can share one Redis; callers never see the
//! prefix. Pattern deletion walks the keyspace with `SCAN MATCH` and deletes
//! in batches, so it never blocks Redis the way `KEYS` would.

use super::{CacheStore, CacheStoreStats};
use crate::caching::{CacheError, CacheResult, KeyPattern};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Keys requested per `SCAN` step
const SCAN_COUNT: usize = 1000;

/// Keys per `DEL` when deleting a scanned family
const DELETE_BATCH: usize = 500;

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Timeout for establishing the connection
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Key prefix for all cache entries
    pub key_prefix: String,

    /// Maximum number of retries per command
    pub max_retries: u32,

    /// Base retry delay, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Duration::from_secs(5),
            key_prefix: "campus:".to_string(),
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Redis cache implementation
pub struct RedisCache {
    config: RedisCacheConfig,

    connection_manager: RwLock<ConnectionManager>,

    hits: AtomicU64,
    misses: AtomicU64,
    connection_errors: AtomicU64,
}

impl RedisCache {
    /// Connect to Redis
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let connection_manager = Self::connect(&config).await?;
        info!("Redis cache connected to {}", config.url);

        Ok(Self {
            config,
            connection_manager: RwLock::new(connection_manager),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
        })
    }

    async fn connect(config: &RedisCacheConfig) -> CacheResult<ConnectionManager> {
        let client = Client::open(config.url.as_str())?;
        match tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout),
        }
    }

    /// Number of failed commands since startup
    pub fn connection_errors(&self) -> u64 {
        self.connection_errors.load(Ordering::Relaxed)
    }

    /// Get the full cache key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Glob over the prefixed keyspace for a pattern
    fn full_glob(&self, pattern: &KeyPattern) -> String {
        format!(
            "{}{}",
            KeyPattern::exact(&self.config.key_prefix).as_redis_glob(),
            pattern.as_redis_glob()
        )
    }

    /// Execute a Redis operation with retry logic
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> CacheResult<T>
    where
        F: Fn(ConnectionManager) -> Fut + Send + Sync,
        Fut: Future<Output = RedisResult<T>> + Send,
        T: Send,
    {
        let mut retries = 0;

        loop {
            let conn = self.connection_manager.read().await.clone();

            match operation(conn).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    error!("Redis operation failed: {}", e);
                    self.connection_errors.fetch_add(1, Ordering::Relaxed);

                    if retries >= self.config.max_retries {
                        return Err(CacheError::Redis(e));
                    }

                    retries += 1;
                    tokio::time::sleep(self.config.retry_delay * retries).await;

                    if e.is_connection_dropped() || e.is_io_error() {
                        if let Err(reconnect_err) = self.reconnect().await {
                            warn!("Failed to reconnect to Redis: {}", reconnect_err);
                        }
                    }
                }
            }
        }
    }

    async fn reconnect(&self) -> CacheResult<()> {
        let new_connection_manager = Self::connect(&self.config).await?;
        *self.connection_manager.write().await = new_connection_manager;

        info!("Reconnected to Redis");
        Ok(())
    }

    /// Every prefixed key matching a glob, as stored in Redis
    async fn scan_full_keys(&self, glob: String) -> CacheResult<Vec<String>> {
        self.execute_with_retry(|mut conn| {
            let glob = glob.clone();
            async move {
                let mut cursor: u64 = 0;
                let mut all_keys = Vec::new();

                loop {
                    let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&glob)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn)
                        .await?;

                    all_keys.extend(keys);

                    if new_cursor == 0 {
                        break;
                    }
                    cursor = new_cursor;
                }

                Ok(all_keys)
            }
        })
        .await
    }

    async fn delete_full_keys(&self, keys: Vec<String>) -> CacheResult<usize> {
        let mut deleted = 0;
        for batch in keys.chunks(DELETE_BATCH) {
            let batch = batch.to_vec();
            let count: usize = self
                .execute_with_retry(|mut conn| {
                    let batch = batch.clone();
                    async move { conn.del(batch).await }
                })
                .await?;
            deleted += count;
        }
        Ok(deleted)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    fn name(&self) -> &'static str {
        "shared"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);

        let result = self
            .execute_with_retry(|mut conn| {
                let full_key = full_key.clone();
                async move { conn.get::<_, Option<Vec<u8>>>(full_key).await }
            })
            .await;

        match result {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Redis cache hit for key: {}", key);
                Ok(Some(value))
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Redis cache miss for key: {}", key);
                Ok(None)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let full_key = self.full_key(key);
        // PX rejects zero
        let ttl_millis = std::cmp::max(ttl.as_millis() as u64, 1);
        let value = value.to_vec();

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            let value = value.clone();
            async move {
                redis::cmd("SET")
                    .arg(full_key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis)
                    .query_async::<_, ()>(&mut conn)
                    .await
            }
        })
        .await?;

        debug!("Set Redis cache key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.full_key(key);

        let deleted_count: i64 = self
            .execute_with_retry(|mut conn| {
                let full_key = full_key.clone();
                async move { conn.del(full_key).await }
            })
            .await?;

        Ok(deleted_count > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.full_key(key);

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            async move { conn.exists(full_key).await }
        })
        .await
    }

    async fn keys_matching(&self, pattern: &KeyPattern) -> CacheResult<Vec<String>> {
        let prefix_len = self.config.key_prefix.len();
        let keys = self.scan_full_keys(self.full_glob(pattern)).await?;

        // SCAN globs are coarser than our patterns for `\`-escaped literals, so
        // re-check each key
        Ok(keys
            .into_iter()
            .filter_map(|full| full.get(prefix_len..).map(str::to_string))
            .filter(|key| pattern.matches(key))
            .collect())
    }

    async fn delete_matching(&self, pattern: &KeyPattern) -> CacheResult<usize> {
        if let Some(key) = pattern.as_exact_key() {
            return Ok(usize::from(self.delete(&key).await?));
        }

        let keys: Vec<String> = self
            .keys_matching(pattern)
            .await?
            .into_iter()
            .map(|key| self.full_key(&key))
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted = self.delete_full_keys(keys).await?;
        debug!("Redis cache: cleared {} keys matching {}", deleted, pattern);
        Ok(deleted)
    }

    async fn clear(&self) -> CacheResult<()> {
        let keys = self.scan_full_keys(self.full_glob(&KeyPattern::new("*"))).await?;
        if !keys.is_empty() {
            let deleted_count = self.delete_full_keys(keys).await?;
            info!("Cleared {} keys from Redis cache", deleted_count);
        }
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        let info: String = self
            .execute_with_retry(|mut conn| async move {
                redis::cmd("INFO").arg("memory").query_async(&mut conn).await
            })
            .await
            .unwrap_or_default();

        let memory_usage = info
            .lines()
            .find(|line| line.starts_with("used_memory:"))
            .and_then(|line| line.split(':').nth(1))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let key_count = self
            .scan_full_keys(self.full_glob(&KeyPattern::new("*")))
            .await
            .map(|keys| keys.len())
            .unwrap_or(0);

        Ok(CacheStoreStats {
            entries: key_count,
            memory_usage,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            // Redis evicts and expires internally
            evictions: 0,
            expired_cleanups: 0,
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let result = self
            .execute_with_retry(|mut conn| async move {
                redis::cmd("PING").query_async::<_, String>(&mut conn).await
            })
            .await;

        match result {
            Ok(response) => Ok(response == "PONG"),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testcontainers::{clients::Cli, core::WaitFor, GenericImage};

    fn redis_image() -> GenericImage {
        GenericImage::new("redis", "7.2.4")
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
    }

    async fn connect(port: u16) -> RedisCache {
        RedisCache::new(RedisCacheConfig {
            url: format!("redis://127.0.0.1:{}", port),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Docker for Redis container
    async fn test_basic_operations() {
        let docker = Cli::default();
        let node = docker.run(redis_image());
        let cache = connect(node.get_host_port_ipv4(6379)).await;

        cache.set("college:slug:iit-delhi", b"profile", Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            cache.get("college:slug:iit-delhi").await.unwrap(),
            Some(b"profile".to_vec())
        );
        assert!(cache.exists("college:slug:iit-delhi").await.unwrap());
        assert!(cache.delete("college:slug:iit-delhi").await.unwrap());
        assert!(!cache.exists("college:slug:iit-delhi").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Docker for Redis container
    async fn test_ttl_expiration() {
        let docker = Cli::default();
        let node = docker.run(redis_image());
        let cache = connect(node.get_host_port_ipv4(6379)).await;

        cache.set("dashboard:stats", b"{}", Duration::from_millis(200)).await.unwrap();
        assert!(cache.exists("dashboard:stats").await.unwrap());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(cache.get("dashboard:stats").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Docker for Redis container
    async fn test_pattern_deletion_respects_prefix() {
        let docker = Cli::default();
        let node = docker.run(redis_image());
        let port = node.get_host_port_ipv4(6379);
        let cache = connect(port).await;
        let other = RedisCache::new(RedisCacheConfig {
            url: format!("redis://127.0.0.1:{}", port),
            key_prefix: "other:".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        let ttl = Duration::from_secs(60);
        for page in 1..=3 {
            cache.set(&format!("colleges:page={}", page), b"[]", ttl).await.unwrap();
        }
        cache.set("news:list:page=1", b"[]", ttl).await.unwrap();
        other.set("colleges:page=1", b"[]", ttl).await.unwrap();

        let mut keys = cache.keys_matching(&KeyPattern::new("colleges:*")).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["colleges:page=1", "colleges:page=2", "colleges:page=3"]);

        assert_eq!(cache.delete_matching(&KeyPattern::new("colleges:*")).await.unwrap(), 3);
        assert!(cache.exists("news:list:page=1").await.unwrap());
        assert!(other.exists("colleges:page=1").await.unwrap());

        cache.clear().await.unwrap();
        assert!(!cache.exists("news:list:page=1").await.unwrap());
        assert!(other.exists("colleges:page=1").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Docker for Redis container
    async fn test_health_check() {
        let docker = Cli::default();
        let node = docker.run(redis_image());
        let cache = connect(node.get_host_port_ipv4(6379)).await;
        assert!(cache.health_check().await.unwrap());
    }
}
