//! # Cache Manager
//!
//! The cache-aside read path over the two tiers:
//!
//! 1. local tier by exact key
//! 2. shared tier by exact key, refilling the local tier on a hit
//! 3. the store, populating both tiers on success
//!
//! Tier failures are logged and counted but never surface to the caller;
//! store failures propagate and are never cached.

use super::{CacheError, CacheResult, CacheStore, CacheStoreStats, InMemoryCache, KeyPattern, RedisCache};
use super::stores::{InMemoryCacheConfig, RedisCacheConfig};
use crate::core::error::{ServiceError, ServiceResult};
use crate::observability::metrics;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the process-local tier
    pub in_memory_enabled: bool,

    /// Local tier settings
    pub in_memory: InMemoryCacheConfig,

    /// Enable the shared Redis tier
    pub redis_enabled: bool,

    /// Shared tier settings
    pub redis: RedisCacheConfig,

    /// Bound on every shared tier call
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Bound on every store fetch made on a miss
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,

    /// Local TTL used when [`CacheManager::read`] refills from the shared tier
    #[serde(with = "humantime_serde")]
    pub refill_ttl: Duration,

    /// Maximum cache key length
    pub max_key_length: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            in_memory_enabled: true,
            in_memory: InMemoryCacheConfig::default(),
            redis_enabled: false,
            redis: RedisCacheConfig::default(),
            operation_timeout: Duration::from_secs(1),
            store_timeout: Duration::from_secs(10),
            refill_ttl: Duration::from_secs(300),
            max_key_length: 250,
        }
    }
}

/// Per-tier TTLs for one family of reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    #[serde(with = "humantime_serde")]
    pub local: Duration,
    #[serde(with = "humantime_serde")]
    pub shared: Duration,
}

impl TtlPolicy {
    pub const fn new(local: Duration, shared: Duration) -> Self {
        Self { local, shared }
    }

    /// Aggregates change with every write
    pub const fn dashboard() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(600))
    }

    pub const fn listing() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(86_400))
    }

    pub const fn detail() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(86_400))
    }

    /// Cutoff data is near-static per exam cycle
    pub const fn predictor() -> Self {
        Self::new(Duration::from_secs(3_600), Duration::from_secs(86_400))
    }
}

/// Named TTL policies per read family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub dashboard: TtlPolicy,
    pub listing: TtlPolicy,
    pub detail: TtlPolicy,
    pub predictor: TtlPolicy,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            dashboard: TtlPolicy::dashboard(),
            listing: TtlPolicy::listing(),
            detail: TtlPolicy::detail(),
            predictor: TtlPolicy::predictor(),
        }
    }
}

impl TtlConfig {
    pub(crate) fn policies(&self) -> [(&'static str, TtlPolicy); 4] {
        [
            ("dashboard", self.dashboard),
            ("listing", self.listing),
            ("detail", self.detail),
            ("predictor", self.predictor),
        ]
    }
}

/// Where a read was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheLevel {
    Local,
    Shared,
    Store,
}

impl CacheLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Shared => "shared",
            Self::Store => "store",
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub local_hits: u64,
    pub shared_hits: u64,
    /// Reads that missed both tiers
    pub misses: u64,
    pub store_fetches: u64,
    pub store_errors: u64,
    /// Swallowed tier failures
    pub tier_errors: u64,
    pub hit_ratio: f64,
    pub local: Option<CacheStoreStats>,
    pub shared: Option<CacheStoreStats>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

/// Per-tier outcome of a pattern deletion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierDeletion {
    pub local: usize,
    pub shared: usize,
    /// `tier: message` for each tier that failed
    pub failures: Vec<String>,
}

impl TierDeletion {
    pub fn total(&self) -> usize {
        self.local + self.shared
    }
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    store_fetches: AtomicU64,
    store_errors: AtomicU64,
    tier_errors: AtomicU64,
}

/// Two-tier cache manager
pub struct CacheManager {
    config: CacheConfig,

    /// Process-local tier
    local: Option<Arc<dyn CacheStore>>,

    /// Shared tier
    shared: Option<Arc<dyn CacheStore>>,

    counters: Counters,
    start_time: chrono::DateTime<chrono::Utc>,
}

impl CacheManager {
    /// Build both tiers from configuration.
    ///
    /// An unreachable Redis is logged and the manager runs local-only.
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        if !config.in_memory_enabled && !config.redis_enabled {
            return Err(CacheError::Configuration {
                message: "At least one cache level must be enabled".to_string(),
            });
        }

        let local: Option<Arc<dyn CacheStore>> = if config.in_memory_enabled {
            let cache = InMemoryCache::new(config.in_memory.clone())?;
            info!("In-memory cache initialized with max {} entries", config.in_memory.max_entries);
            Some(Arc::new(cache))
        } else {
            None
        };

        let shared: Option<Arc<dyn CacheStore>> = if config.redis_enabled {
            match RedisCache::new(config.redis.clone()).await {
                Ok(cache) => {
                    info!("Redis cache initialized at {}", config.redis.url);
                    Some(Arc::new(cache))
                }
                Err(e) if local.is_some() => {
                    warn!("Redis cache unavailable at {}, running local-only: {}", config.redis.url, e);
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(Self::with_tiers(config, local, shared))
    }

    /// Build a manager over already-constructed tiers (fakes in tests)
    pub fn with_tiers(
        config: CacheConfig,
        local: Option<Arc<dyn CacheStore>>,
        shared: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        Self {
            config,
            local,
            shared,
            counters: Counters::default(),
            start_time: chrono::Utc::now(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    /// Raw read through both tiers; `None` when neither tier holds the key
    pub async fn read(&self, key: &str) -> ServiceResult<Option<Vec<u8>>> {
        self.validate_key(key)?;
        Ok(self.lookup(key, self.config.refill_ttl).await.map(|(value, _)| value))
    }

    /// Populate both tiers. Tier failures are logged, never returned.
    pub async fn write(&self, key: &str, value: &[u8], ttl: TtlPolicy) -> ServiceResult<()> {
        self.validate_key(key)?;
        self.populate(key, value, ttl).await;
        Ok(())
    }

    /// Typed cache-aside read: on a miss in both tiers `fetch` is called
    /// (bounded by the store timeout) and its value populates both tiers.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, ttl: TtlPolicy, fetch: F) -> ServiceResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        Ok(self.get_or_fetch_traced(key, ttl, fetch).await?.0)
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), also reporting which level
    /// answered
    pub async fn get_or_fetch_traced<T, F, Fut>(
        &self,
        key: &str,
        ttl: TtlPolicy,
        fetch: F,
    ) -> ServiceResult<(T, CacheLevel)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        self.validate_key(key)?;

        if let Some((bytes, level)) = self.lookup(key, ttl.local).await {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => return Ok((value, level)),
                Err(e) => {
                    // Stale shape from an older deployment; treat as a miss
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.delete_exact(key).await?;
                }
            }
        }

        let value = self.fetch_from_store(key, fetch).await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => self.populate(key, &bytes, ttl).await,
            Err(e) => warn!("Not caching {}: serialization failed: {}", key, e),
        }

        Ok((value, CacheLevel::Store))
    }

    /// Delete one key from both tiers; true if either tier held it
    pub async fn delete_exact(&self, key: &str) -> ServiceResult<bool> {
        self.validate_key(key)?;
        let mut deleted = false;

        if let Some(local) = &self.local {
            match local.delete(key).await {
                Ok(found) => deleted |= found,
                Err(e) => self.tier_failed(local.name(), "delete", key, &e),
            }
        }
        if let Some(shared) = &self.shared {
            match self.bounded(shared.delete(key)).await {
                Ok(found) => deleted |= found,
                Err(e) => self.tier_failed(shared.name(), "delete", key, &e),
            }
        }

        Ok(deleted)
    }

    /// Delete every key matching `pattern` from both tiers; returns the number
    /// of entries removed across tiers
    pub async fn delete_by_pattern(&self, pattern: &KeyPattern) -> usize {
        self.purge(pattern).await.total()
    }

    /// Pattern deletion with a per-tier breakdown
    pub async fn purge(&self, pattern: &KeyPattern) -> TierDeletion {
        let mut outcome = TierDeletion::default();
        let label = pattern.to_string();

        if let Some(local) = &self.local {
            match local.delete_matching(pattern).await {
                Ok(count) => outcome.local = count,
                Err(e) => {
                    self.tier_failed(local.name(), "delete_matching", &label, &e);
                    outcome.failures.push(format!("{}: {}", local.name(), e));
                }
            }
        }
        if let Some(shared) = &self.shared {
            match self.bounded(shared.delete_matching(pattern)).await {
                Ok(count) => outcome.shared = count,
                Err(e) => {
                    self.tier_failed(shared.name(), "delete_matching", &label, &e);
                    outcome.failures.push(format!("{}: {}", shared.name(), e));
                }
            }
        }

        outcome
    }

    /// Empty both tiers
    pub async fn clear_all(&self) -> CacheResult<()> {
        let mut errors = Vec::new();

        if let Some(local) = &self.local {
            if let Err(e) = local.clear().await {
                errors.push(format!("{} cache clear error: {}", local.name(), e));
            }
        }
        if let Some(shared) = &self.shared {
            if let Err(e) = self.bounded(shared.clear()).await {
                errors.push(format!("{} cache clear error: {}", shared.name(), e));
            }
        }

        if !errors.is_empty() {
            return Err(CacheError::Store {
                message: errors.join("; "),
            });
        }

        info!("All cache levels cleared");
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let local_hits = self.counters.local_hits.load(Ordering::Relaxed);
        let shared_hits = self.counters.shared_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let reads = local_hits + shared_hits + misses;

        let local = match &self.local {
            Some(local) => local.stats().await.ok(),
            None => None,
        };
        let shared = match &self.shared {
            Some(shared) => self.bounded(shared.stats()).await.ok(),
            None => None,
        };

        CacheStats {
            local_hits,
            shared_hits,
            misses,
            store_fetches: self.counters.store_fetches.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            tier_errors: self.counters.tier_errors.load(Ordering::Relaxed),
            hit_ratio: if reads > 0 {
                (local_hits + shared_hits) as f64 / reads as f64
            } else {
                0.0
            },
            local,
            shared,
            start_time: self.start_time,
        }
    }

    /// True when every configured tier answers its health probe
    pub async fn health_check(&self) -> bool {
        let mut healthy = true;

        if let Some(local) = &self.local {
            if !local.health_check().await.unwrap_or(false) {
                healthy = false;
                warn!("Local cache health check failed");
            }
        }
        if let Some(shared) = &self.shared {
            if !self.bounded(shared.health_check()).await.unwrap_or(false) {
                healthy = false;
                warn!("Shared cache health check failed");
            }
        }

        healthy
    }

    /// Tier lookup; refills the local tier on a shared hit
    async fn lookup(&self, key: &str, refill_ttl: Duration) -> Option<(Vec<u8>, CacheLevel)> {
        if let Some(local) = &self.local {
            match local.get(key).await {
                Ok(Some(value)) => {
                    debug!("Cache hit in local cache for key: {}", key);
                    self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_hit(CacheLevel::Local.as_str());
                    return Some((value, CacheLevel::Local));
                }
                Ok(None) => debug!("Cache miss in local cache for key: {}", key),
                Err(e) => self.tier_failed(local.name(), "get", key, &e),
            }
        }

        if let Some(shared) = &self.shared {
            match self.bounded(shared.get(key)).await {
                Ok(Some(value)) => {
                    debug!("Cache hit in shared cache for key: {}", key);
                    self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_hit(CacheLevel::Shared.as_str());

                    if let Some(local) = &self.local {
                        if let Err(e) = local.set(key, &value, refill_ttl).await {
                            self.tier_failed(local.name(), "set", key, &e);
                        }
                    }
                    return Some((value, CacheLevel::Shared));
                }
                Ok(None) => debug!("Cache miss in shared cache for key: {}", key),
                Err(e) => self.tier_failed(shared.name(), "get", key, &e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_miss();
        None
    }

    async fn fetch_from_store<T, F, Fut>(&self, key: &str, fetch: F) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        self.counters.store_fetches.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = match tokio::time::timeout(self.config.store_timeout, fetch()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::timeout(
                format!("store fetch for {}", key),
                self.config.store_timeout,
            )),
        };

        metrics::record_store_fetch(start.elapsed(), result.is_ok());
        if let Err(e) = &result {
            self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
            error!("Store fetch for {} failed: {}", key, e);
        }
        result
    }

    /// Shared tier first (longer TTL), then local
    async fn populate(&self, key: &str, value: &[u8], ttl: TtlPolicy) {
        if let Some(shared) = &self.shared {
            if let Err(e) = self.bounded(shared.set(key, value, ttl.shared)).await {
                self.tier_failed(shared.name(), "set", key, &e);
            }
        }
        if let Some(local) = &self.local {
            if let Err(e) = local.set(key, value, ttl.local).await {
                self.tier_failed(local.name(), "set", key, &e);
            }
        }
        debug!("Cached key: {} with TTL: {:?}", key, ttl);
    }

    /// Apply the shared-tier operation timeout
    async fn bounded<T, Fut>(&self, operation: Fut) -> CacheResult<T>
    where
        Fut: Future<Output = CacheResult<T>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    }

    fn tier_failed(&self, tier: &'static str, operation: &'static str, key: &str, err: &CacheError) {
        self.counters.tier_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_tier_error(tier, operation);
        warn!("{} cache {} failed for {}: {}", tier, operation, key, err);
    }

    fn validate_key(&self, key: &str) -> ServiceResult<()> {
        if key.is_empty() {
            return Err(ServiceError::validation("key", "Cache key cannot be empty"));
        }

        if key.len() > self.config.max_key_length {
            return Err(ServiceError::validation(
                "key",
                format!(
                    "Cache key length {} exceeds maximum {}",
                    key.len(),
                    self.config.max_key_length
                ),
            ));
        }

        Ok(())
    }
}
