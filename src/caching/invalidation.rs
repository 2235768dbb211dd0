//! # Cache Invalidation Module
//!
//! Every tracked entity owns a fixed set of key patterns: *broad* patterns for
//! list, search and aggregate views, and *keyed* patterns (with a `{key}`
//! placeholder) for per-entity detail views. A declarative dependency table
//! names the other entities whose cached views embed data from a write.
//!
//! [`InvalidationCoordinator::on_write`] resolves the written entity's
//! patterns plus its dependents' patterns and deletes them from both tiers.
//! Dependencies are one level deep: a dependent's own dependents are not
//! followed.

use super::{CacheManager, KeyPattern};
use crate::core::error::ServiceResult;
use crate::observability::metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Tracked entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    College,
    Placement,
    PlacementStats,
    TopRecruiter,
    Cutoff,
    News,
    Dashboard,
    Predictor,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        Self::College,
        Self::Placement,
        Self::PlacementStats,
        Self::TopRecruiter,
        Self::Cutoff,
        Self::News,
        Self::Dashboard,
        Self::Predictor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::College => "college",
            Self::Placement => "placement",
            Self::PlacementStats => "placementStats",
            Self::TopRecruiter => "topRecruiter",
            Self::Cutoff => "cutoff",
            Self::News => "news",
            Self::Dashboard => "dashboard",
            Self::Predictor => "predictor",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key patterns owned by one entity type
#[derive(Debug, Clone, Default)]
pub struct EntityPatterns {
    /// Lists, searches, filters and aggregates; always cleared in full
    pub broad: Vec<KeyPattern>,
    /// Per-entity views; resolved with the entity key when known
    pub keyed: Vec<KeyPattern>,
}

/// How much of a dependent entity's cache a write reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyScope {
    /// Only the dependent's keyed patterns, resolved with the same key
    SameKey,
    /// Every pattern of the dependent
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub dependent: EntityType,
    pub scope: DependencyScope,
}

/// Static pattern registry and dependency table, fixed at startup
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    patterns: HashMap<EntityType, EntityPatterns>,
    dependencies: HashMap<EntityType, Vec<Dependency>>,
}

impl PatternRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry covering every catalog read family
    pub fn standard() -> Self {
        use DependencyScope::{All, SameKey};
        use EntityType::*;

        Self::new()
            .register(College, &["colleges:*"], &["college:slug:{key}"])
            .register(Placement, &[], &["placement:college:{key}"])
            .register(PlacementStats, &[], &["placementStats:college:{key}"])
            .register(TopRecruiter, &[], &["topRecruiters:{key}:*"])
            .register(Cutoff, &["cutoffs:*"], &[])
            .register(News, &["news:list:*"], &["news:slug:{key}"])
            .register(Dashboard, &["dashboard:*"], &[])
            .register(Predictor, &["predictor:*"], &[])
            .depends(College, Dashboard, All)
            .depends(College, Predictor, All)
            .depends(Placement, College, SameKey)
            .depends(Placement, Dashboard, All)
            .depends(PlacementStats, College, SameKey)
            .depends(PlacementStats, Dashboard, All)
            .depends(TopRecruiter, College, SameKey)
            .depends(TopRecruiter, Dashboard, All)
            .depends(Cutoff, College, SameKey)
            .depends(Cutoff, Dashboard, All)
            .depends(Cutoff, Predictor, All)
            .depends(News, Dashboard, All)
    }

    /// Set the patterns of an entity, replacing earlier ones
    pub fn register(mut self, entity: EntityType, broad: &[&str], keyed: &[&str]) -> Self {
        self.patterns.insert(
            entity,
            EntityPatterns {
                broad: broad.iter().map(|p| KeyPattern::new(p)).collect(),
                keyed: keyed.iter().map(|p| KeyPattern::new(p)).collect(),
            },
        );
        self
    }

    /// Declare that writes to `entity` invalidate `dependent`
    pub fn depends(mut self, entity: EntityType, dependent: EntityType, scope: DependencyScope) -> Self {
        let deps = self.dependencies.entry(entity).or_default();
        if !deps.iter().any(|d| d.dependent == dependent) {
            deps.push(Dependency { dependent, scope });
        }
        self
    }

    pub fn patterns_for(&self, entity: EntityType) -> Option<&EntityPatterns> {
        self.patterns.get(&entity)
    }

    pub fn dependents(&self, entity: EntityType) -> &[Dependency] {
        self.dependencies.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Concrete patterns to delete after a write to `entity`
    pub fn resolve(&self, entity: EntityType, key: Option<&str>) -> Vec<KeyPattern> {
        let mut resolved: Vec<KeyPattern> = Vec::new();
        let mut push = |pattern: KeyPattern| {
            if !resolved.contains(&pattern) {
                resolved.push(pattern);
            }
        };

        if let Some(own) = self.patterns_for(entity) {
            own.broad.iter().cloned().for_each(&mut push);
            own.keyed.iter().map(|p| p.resolve(key)).for_each(&mut push);
        }

        for dep in self.dependents(entity) {
            let Some(patterns) = self.patterns_for(dep.dependent) else {
                continue;
            };
            match dep.scope {
                DependencyScope::SameKey => {
                    patterns.keyed.iter().map(|p| p.resolve(key)).for_each(&mut push);
                }
                DependencyScope::All => {
                    patterns.broad.iter().cloned().for_each(&mut push);
                    patterns.keyed.iter().map(|p| p.resolve(None)).for_each(&mut push);
                }
            }
        }

        resolved
    }
}

/// Outcome of one invalidation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub entity: Option<EntityType>,
    pub key: Option<String>,
    /// Patterns deleted, in resolution order
    pub patterns: Vec<String>,
    pub local_deleted: usize,
    pub shared_deleted: usize,
    /// Swallowed tier failures as `tier: message`
    pub failures: Vec<String>,
}

impl InvalidationReport {
    pub fn total_deleted(&self) -> usize {
        self.local_deleted + self.shared_deleted
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Broadcast to observers after each pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationEvent {
    /// An entity write invalidated these patterns
    EntityWritten {
        entity: EntityType,
        key: Option<String>,
        patterns: Vec<String>,
        keys_removed: usize,
    },
    /// Ad-hoc pattern invalidation
    Patterns { patterns: Vec<String>, keys_removed: usize },
    /// Both tiers were emptied
    All,
}

/// Clears both cache tiers after writes
pub struct InvalidationCoordinator {
    cache: Arc<CacheManager>,
    registry: Arc<PatternRegistry>,
    event_sender: broadcast::Sender<InvalidationEvent>,
}

impl InvalidationCoordinator {
    pub fn new(cache: Arc<CacheManager>, registry: PatternRegistry) -> Self {
        let (event_sender, _) = broadcast::channel(1000);
        Self {
            cache,
            registry: Arc::new(registry),
            event_sender,
        }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Subscribe to invalidation events
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.event_sender.subscribe()
    }

    /// Invalidate everything a write to `entity` (optionally identified by
    /// `key`) may have made stale. Best effort: tier failures are reported,
    /// never returned as errors.
    pub async fn on_write(&self, entity: EntityType, key: Option<&str>) -> InvalidationReport {
        let patterns = self.registry.resolve(entity, key);
        let mut report = self.delete_patterns(&patterns).await;
        report.entity = Some(entity);
        report.key = key.map(str::to_string);

        metrics::record_invalidation(entity.as_str(), report.total_deleted());
        info!(
            entity = %entity,
            key = key.unwrap_or("*"),
            patterns = report.patterns.len(),
            local = report.local_deleted,
            shared = report.shared_deleted,
            "Cache invalidated after write"
        );

        self.publish(InvalidationEvent::EntityWritten {
            entity,
            key: report.key.clone(),
            patterns: report.patterns.clone(),
            keys_removed: report.total_deleted(),
        });
        report
    }

    /// Invalidate an explicit list of patterns
    pub async fn invalidate_patterns(&self, patterns: &[KeyPattern]) -> InvalidationReport {
        let report = self.delete_patterns(patterns).await;
        self.publish(InvalidationEvent::Patterns {
            patterns: report.patterns.clone(),
            keys_removed: report.total_deleted(),
        });
        report
    }

    /// Empty both tiers
    pub async fn invalidate_all(&self) -> ServiceResult<()> {
        self.cache.clear_all().await?;
        self.publish(InvalidationEvent::All);
        Ok(())
    }

    async fn delete_patterns(&self, patterns: &[KeyPattern]) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for pattern in patterns {
            let outcome = self.cache.purge(pattern).await;
            debug!(
                "Invalidated {} local / {} shared keys for {}",
                outcome.local, outcome.shared, pattern
            );
            report.local_deleted += outcome.local;
            report.shared_deleted += outcome.shared;
            report.failures.extend(outcome.failures);
            report.patterns.push(pattern.to_string());
        }

        if !report.is_clean() {
            warn!("Invalidation finished with {} tier failures", report.failures.len());
        }
        report
    }

    fn publish(&self, event: InvalidationEvent) {
        // No subscribers is not an error
        if self.event_sender.receiver_count() > 0 {
            if let Err(e) = self.event_sender.send(event) {
                warn!("Failed to broadcast invalidation event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheConfig, CacheStore, InMemoryCache, TtlPolicy};
    use crate::caching::stores::InMemoryCacheConfig;

    fn strings(patterns: &[KeyPattern]) -> Vec<String> {
        patterns.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_placement_write_reaches_college_detail_and_dashboard() {
        let registry = PatternRegistry::standard();
        let resolved = strings(&registry.resolve(EntityType::Placement, Some("iit-delhi")));
        assert_eq!(
            resolved,
            vec![
                "placement:college:iit-delhi",
                "college:slug:iit-delhi",
                "dashboard:*",
            ]
        );
    }

    #[test]
    fn test_unknown_key_widens_keyed_patterns() {
        let registry = PatternRegistry::standard();
        let resolved = strings(&registry.resolve(EntityType::TopRecruiter, None));
        assert_eq!(resolved, vec!["topRecruiters:*:*", "college:slug:*", "dashboard:*"]);
    }

    #[test]
    fn test_all_scope_uses_every_dependent_pattern() {
        let registry = PatternRegistry::standard();
        let resolved = strings(&registry.resolve(EntityType::Cutoff, Some("nit-trichy")));
        assert_eq!(
            resolved,
            vec!["cutoffs:*", "college:slug:nit-trichy", "dashboard:*", "predictor:*"]
        );

        let college = strings(&registry.resolve(EntityType::College, Some("iit-bombay")));
        assert_eq!(
            college,
            vec!["colleges:*", "college:slug:iit-bombay", "dashboard:*", "predictor:*"]
        );
    }

    #[test]
    fn test_dependencies_are_not_transitive() {
        // Placement -> College and College -> Predictor, but a placement
        // write must not reach the predictor cache
        let registry = PatternRegistry::standard();
        let resolved = strings(&registry.resolve(EntityType::Placement, Some("x")));
        assert!(!resolved.contains(&"predictor:*".to_string()));
    }

    #[test]
    fn test_duplicate_dependency_ignored() {
        let registry = PatternRegistry::new()
            .register(EntityType::News, &["news:list:*"], &[])
            .register(EntityType::Dashboard, &["dashboard:*"], &[])
            .depends(EntityType::News, EntityType::Dashboard, DependencyScope::All)
            .depends(EntityType::News, EntityType::Dashboard, DependencyScope::SameKey);
        assert_eq!(registry.dependents(EntityType::News).len(), 1);
        assert!(registry.dependents(EntityType::Dashboard).is_empty());
    }

    fn coordinator() -> (InvalidationCoordinator, Arc<CacheManager>) {
        let local: Arc<dyn CacheStore> =
            Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());
        let shared: Arc<dyn CacheStore> =
            Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());
        let cache = Arc::new(CacheManager::with_tiers(CacheConfig::default(), Some(local), Some(shared)));
        (
            InvalidationCoordinator::new(cache.clone(), PatternRegistry::standard()),
            cache,
        )
    }

    #[tokio::test]
    async fn test_on_write_clears_both_tiers() {
        let (coordinator, cache) = coordinator();
        let ttl = TtlPolicy::detail();
        cache.write("college:slug:iit-delhi", b"1", ttl).await.unwrap();
        cache.write("college:slug:iit-bombay", b"2", ttl).await.unwrap();
        cache.write("placement:college:iit-delhi", b"3", ttl).await.unwrap();
        cache.write("dashboard:stats", b"4", ttl).await.unwrap();
        cache.write("news:list:page=1", b"5", ttl).await.unwrap();

        let mut events = coordinator.subscribe();
        let report = coordinator.on_write(EntityType::Placement, Some("iit-delhi")).await;

        assert!(report.is_clean());
        assert_eq!(report.local_deleted, 3);
        assert_eq!(report.shared_deleted, 3);
        assert_eq!(cache.read("college:slug:iit-delhi").await.unwrap(), None);
        assert_eq!(cache.read("dashboard:stats").await.unwrap(), None);
        assert!(cache.read("college:slug:iit-bombay").await.unwrap().is_some());
        assert!(cache.read("news:list:page=1").await.unwrap().is_some());

        match events.try_recv().unwrap() {
            InvalidationEvent::EntityWritten { entity, keys_removed, .. } => {
                assert_eq!(entity, EntityType::Placement);
                assert_eq!(keys_removed, 6);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let (coordinator, cache) = coordinator();
        cache.write("predictor:a", b"1", TtlPolicy::predictor()).await.unwrap();
        coordinator.invalidate_all().await.unwrap();
        assert_eq!(cache.read("predictor:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_patterns() {
        let (coordinator, cache) = coordinator();
        cache.write("cutoffs:exam=JEE", b"1", TtlPolicy::listing()).await.unwrap();
        let report = coordinator.invalidate_patterns(&[KeyPattern::new("cutoffs:*")]).await;
        assert_eq!(report.total_deleted(), 2);
        assert_eq!(report.entity, None);
    }
}
