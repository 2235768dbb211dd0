//! # Caching System Module
//!
//! Two-tier read-through cache sitting in front of the authoritative store:
//! a process-local in-memory tier and a shared Redis tier, plus the
//! pattern-based invalidation that keeps both coherent after writes.
//!
//! ## Architecture
//! 1. **Cache Stores**: [`InMemoryCache`] (local) and [`RedisCache`] (shared),
//!    both behind the [`CacheStore`] trait so tests can inject fakes
//! 2. **Key Patterns**: one [`KeyPattern`] abstraction used for matching in
//!    both tiers
//! 3. **Key Builder**: deterministic `namespace:qualifier:...` keys
//! 4. **Cache Manager**: the cache-aside read path (local -> shared -> store)
//! 5. **Invalidation**: entity pattern registry, dependency table and the
//!    coordinator that clears both tiers after a write
//!
//! ## Usage Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use campus_cache::caching::{CacheConfig, CacheManager, TtlPolicy};
//!
//! let cache = Arc::new(CacheManager::new(CacheConfig::default()).await?);
//! let stats: DashboardStats = cache
//!     .get_or_fetch("dashboard:stats", TtlPolicy::dashboard(), || async {
//!         compute_stats(&store).await
//!     })
//!     .await?;
//! ```

pub mod cache_manager;
pub mod invalidation;
pub mod key_builder;
pub mod key_pattern;
pub mod stores;

pub use cache_manager::{CacheConfig, CacheLevel, CacheManager, CacheStats, TtlConfig, TtlPolicy};
pub use invalidation::{
    Dependency, DependencyScope, EntityPatterns, EntityType, InvalidationCoordinator,
    InvalidationEvent, InvalidationReport, PatternRegistry,
};
pub use key_builder::KeyBuilder;
pub use key_pattern::KeyPattern;
pub use stores::{CacheEntry, CacheStore, CacheStoreStats, InMemoryCache, RedisCache};

use crate::core::error::ServiceError;

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Key generation error: {message}")]
    KeyGeneration { message: String },

    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Cache not available")]
    Unavailable,
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Configuration { message } => ServiceError::config(message),
            CacheError::KeyGeneration { message } => ServiceError::validation("key", message),
            other => ServiceError::cache_tier("cache", other.to_string()),
        }
    }
}
