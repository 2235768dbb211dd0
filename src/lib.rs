//! # Campus Cache Library
//!
//! A two-tier cache layer (process-local cache, shared Redis cache,
//! authoritative store) for a read-heavy college and admissions content API,
//! with pattern-based invalidation driven by writes and a rank predictor whose
//! results are cached the same way.
//!
//! ## Layout
//! - [`caching`]: cache tiers, key patterns, the cache-aside read path and the
//!   invalidation coordinator
//! - [`store`]: the query surface of the authoritative dataset
//! - [`catalog`]: cached reads and write-with-invalidate operations per entity
//! - [`predictor`]: the filtering, grouping, scoring and pagination pipeline
//! - [`core`]: error type and configuration
//! - [`observability`]: logging setup and metrics
//!
//! ## Usage Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use campus_cache::{CampusServices, ServiceConfig};
//! use campus_cache::store::MemoryStore;
//!
//! let config = ServiceConfig::load_from_file("config/campus.yaml").await?;
//! let services = CampusServices::build(config, Arc::new(MemoryStore::new())).await?;
//! let page = services.predictor.predict(&params).await?;
//! ```

/// Error type and service configuration
pub mod core;

/// Two-tier cache, key patterns and invalidation
pub mod caching;

/// Authoritative document store abstraction
pub mod store;

/// Catalog services: colleges, placements, cutoffs, news, dashboard
pub mod catalog;

/// College rank predictor
pub mod predictor;

/// Logging and metrics
pub mod observability;

/// Wiring of every service over one store and one cache
pub mod services;

pub use crate::core::config::ServiceConfig;
pub use crate::core::error::{ServiceError, ServiceResult};
pub use caching::{CacheManager, EntityType, InvalidationCoordinator, KeyPattern, TtlPolicy};
pub use predictor::{Mode, PredictParams, PredictionPage, Predictor};
pub use services::CampusServices;
