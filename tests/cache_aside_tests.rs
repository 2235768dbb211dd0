//! # Cache-Aside Integration Tests
//!
//! Read path behaviour across both tiers: population on a miss, hits without
//! store calls, expiry, and reads surviving a failing shared tier.

use async_trait::async_trait;
use campus_cache::caching::stores::InMemoryCacheConfig;
use campus_cache::caching::{
    CacheConfig, CacheError, CacheLevel, CacheManager, CacheResult, CacheStore, CacheStoreStats, InMemoryCache,
    KeyPattern, TtlPolicy,
};
use campus_cache::ServiceError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared tier stand-in that can be switched off
struct SwitchableTier {
    inner: InMemoryCache,
    down: AtomicBool,
}

impl SwitchableTier {
    fn new() -> Self {
        Self {
            inner: InMemoryCache::new(InMemoryCacheConfig::default()).unwrap(),
            down: AtomicBool::new(false),
        }
    }

    fn check(&self) -> CacheResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SwitchableTier {
    fn name(&self) -> &'static str {
        "shared"
    }
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }
    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }
    async fn keys_matching(&self, pattern: &KeyPattern) -> CacheResult<Vec<String>> {
        self.check()?;
        self.inner.keys_matching(pattern).await
    }
    async fn delete_matching(&self, pattern: &KeyPattern) -> CacheResult<usize> {
        self.check()?;
        self.inner.delete_matching(pattern).await
    }
    async fn clear(&self) -> CacheResult<()> {
        self.check()?;
        self.inner.clear().await
    }
    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        self.check()?;
        self.inner.stats().await
    }
    async fn health_check(&self) -> CacheResult<bool> {
        self.check()?;
        self.inner.health_check().await
    }
}

fn manager() -> (CacheManager, Arc<InMemoryCache>, Arc<SwitchableTier>) {
    let local = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());
    let shared = Arc::new(SwitchableTier::new());
    let manager = CacheManager::with_tiers(
        CacheConfig::default(),
        Some(local.clone() as Arc<dyn CacheStore>),
        Some(shared.clone() as Arc<dyn CacheStore>),
    );
    (manager, local, shared)
}

#[tokio::test]
async fn test_cold_read_populates_both_tiers_then_skips_store() {
    let (manager, local, shared) = manager();
    let calls = AtomicUsize::new(0);
    let store_calls = &calls;
    let fetch = move || async move {
        store_calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ServiceError>(json!({"slug": "iit-delhi", "nirf": 2}))
    };

    let first: Value = manager.get_or_fetch("college:slug:iit-delhi", TtlPolicy::detail(), fetch).await.unwrap();
    assert_eq!(first["nirf"], 2);
    assert!(local.exists("college:slug:iit-delhi").await.unwrap());
    assert!(shared.exists("college:slug:iit-delhi").await.unwrap());

    let second: Value = manager.get_or_fetch("college:slug:iit-delhi", TtlPolicy::detail(), fetch).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = manager.stats().await;
    assert_eq!(stats.local_hits, 1);
    assert_eq!(stats.store_fetches, 1);
}

#[tokio::test]
async fn test_local_entry_expires_after_ttl() {
    let (manager, local, _shared) = manager();
    let ttl = TtlPolicy::new(Duration::from_millis(50), Duration::from_secs(60));
    manager.write("dashboard:stats", b"{}", ttl).await.unwrap();
    assert!(local.get("dashboard:stats").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(local.get("dashboard:stats").await.unwrap().is_none());

    // The shared tier still answers and refills the local tier
    let (_, level): (Value, CacheLevel) = manager
        .get_or_fetch_traced("dashboard:stats", ttl, || async { Err(ServiceError::store("unused")) })
        .await
        .unwrap();
    assert_eq!(level, CacheLevel::Shared);
}

#[tokio::test]
async fn test_shared_tier_outage_is_invisible_to_reads() {
    let (manager, _local, shared) = manager();
    shared.down.store(true, Ordering::SeqCst);

    let value: Value = manager
        .get_or_fetch("news:slug:exam-dates", TtlPolicy::detail(), || async { Ok::<_, ServiceError>(json!("fresh")) })
        .await
        .unwrap();
    assert_eq!(value, json!("fresh"));

    // Served locally on the next read despite the outage
    let (_, level): (Value, CacheLevel) = manager
        .get_or_fetch_traced("news:slug:exam-dates", TtlPolicy::detail(), || async {
            Err(ServiceError::store("unused"))
        })
        .await
        .unwrap();
    assert_eq!(level, CacheLevel::Local);
    assert!(manager.stats().await.tier_errors >= 2);
    assert!(!manager.health_check().await);
}

#[tokio::test]
async fn test_store_failure_propagates_and_is_not_cached() {
    let (manager, local, shared) = manager();

    let result: Result<Value, _> = manager
        .get_or_fetch("colleges:list:page=1", TtlPolicy::listing(), || async {
            Err(ServiceError::store("connection refused"))
        })
        .await;
    assert!(matches!(result, Err(ServiceError::Store { .. })));
    assert!(!local.exists("colleges:list:page=1").await.unwrap());
    assert!(!shared.exists("colleges:list:page=1").await.unwrap());
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let local: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());
    let config = CacheConfig {
        store_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let manager = CacheManager::with_tiers(config, Some(local), None);

    let result: Result<Value, _> = manager
        .get_or_fetch("predictor:rank=1", TtlPolicy::predictor(), || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ServiceError>(json!([]))
        })
        .await;
    assert!(matches!(result, Err(ServiceError::Timeout { .. })));
}

#[tokio::test]
async fn test_delete_by_pattern_and_exact() {
    let (manager, _local, _shared) = manager();
    for key in ["colleges:list:page=1", "colleges:list:page=2", "college:slug:x"] {
        manager.write(key, b"1", TtlPolicy::listing()).await.unwrap();
    }

    // Two keys in each tier
    assert_eq!(manager.delete_by_pattern(&KeyPattern::new("colleges:*")).await, 4);
    assert!(manager.read("colleges:list:page=1").await.unwrap().is_none());

    assert!(manager.delete_exact("college:slug:x").await.unwrap());
    assert!(!manager.delete_exact("college:slug:x").await.unwrap());
}

#[tokio::test]
async fn test_empty_key_rejected() {
    let (manager, _local, _shared) = manager();
    let err = manager.read("").await.unwrap_err();
    assert!(err.is_client_error());
}

#[tokio::test]
#[ignore] // Requires Docker for Redis container
async fn test_shared_tier_is_seen_by_other_instances() {
    use campus_cache::caching::stores::RedisCacheConfig;
    use campus_cache::caching::RedisCache;
    use testcontainers::{clients::Cli, core::WaitFor, GenericImage};

    let docker = Cli::default();
    let node = docker.run(
        GenericImage::new("redis", "7.2.4").with_wait_for(WaitFor::message_on_stdout("Ready to accept connections")),
    );
    let url = format!("redis://127.0.0.1:{}", node.get_host_port_ipv4(6379));

    let mut instances = Vec::new();
    for _ in 0..2 {
        let shared = RedisCache::new(RedisCacheConfig {
            url: url.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
        let local: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());
        instances.push(CacheManager::with_tiers(
            CacheConfig::default(),
            Some(local),
            Some(Arc::new(shared) as Arc<dyn CacheStore>),
        ));
    }

    let _: Value = instances[0]
        .get_or_fetch("dashboard:stats", TtlPolicy::dashboard(), || async {
            Ok::<_, ServiceError>(json!({"totalColleges": 12}))
        })
        .await
        .unwrap();

    let (value, level): (Value, CacheLevel) = instances[1]
        .get_or_fetch_traced("dashboard:stats", TtlPolicy::dashboard(), || async {
            Err(ServiceError::store("unused"))
        })
        .await
        .unwrap();
    assert_eq!(value["totalColleges"], 12);
    assert_eq!(level, CacheLevel::Shared);

    assert_eq!(instances[0].delete_by_pattern(&KeyPattern::new("dashboard:*")).await, 2);
}
