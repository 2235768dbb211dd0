//! Service wiring: one cache manager, one invalidation coordinator and one
//! store shared by every catalog service and the predictor.

use crate::caching::{CacheManager, InvalidationCoordinator, PatternRegistry};
use crate::catalog::{CatalogContext, Colleges, Cutoffs, Dashboard, News, Placements};
use crate::core::config::ServiceConfig;
use crate::core::error::ServiceResult;
use crate::observability::metrics;
use crate::predictor::Predictor;
use crate::store::Store;
use std::sync::Arc;
use tracing::info;

/// Every public operation of the crate, ready to be called by an API layer
#[derive(Clone)]
pub struct CampusServices {
    pub cache: Arc<CacheManager>,
    pub invalidation: Arc<InvalidationCoordinator>,
    pub colleges: Colleges,
    pub placements: Placements,
    pub cutoffs: Cutoffs,
    pub news: News,
    pub dashboard: Dashboard,
    pub predictor: Arc<Predictor>,
}

impl CampusServices {
    /// Validate `config`, build the cache tiers and wire every service
    pub async fn build(config: ServiceConfig, store: Arc<dyn Store>) -> ServiceResult<Self> {
        config.validate()?;
        metrics::describe_metrics();

        let cache = Arc::new(CacheManager::new(config.cache.clone()).await?);
        info!(
            shared_tier = cache.has_shared_tier(),
            "Cache manager ready"
        );
        Ok(Self::with_cache(config, store, cache))
    }

    /// Wire every service over an existing cache manager
    pub fn with_cache(config: ServiceConfig, store: Arc<dyn Store>, cache: Arc<CacheManager>) -> Self {
        let invalidation = Arc::new(InvalidationCoordinator::new(cache.clone(), PatternRegistry::standard()));
        let ctx = CatalogContext::new(store.clone(), cache.clone(), invalidation.clone(), config.ttl.clone());
        let predictor = Predictor::new(store, cache.clone(), config.predictor, config.ttl.predictor);

        Self {
            colleges: Colleges::new(ctx.clone()),
            placements: Placements::new(ctx.clone()),
            cutoffs: Cutoffs::new(ctx.clone()),
            news: News::new(ctx.clone()),
            dashboard: Dashboard::new(ctx),
            predictor: Arc::new(predictor),
            invalidation,
            cache,
        }
    }
}
