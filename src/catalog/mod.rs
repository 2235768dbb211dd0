//! # Catalog Module
//!
//! Cached reads and write-with-invalidate operations for every catalog
//! entity. Reads go through the two-tier cache with keys that fall under the
//! entity's registered patterns; writes mutate the store first and then hand
//! the entity to the [`InvalidationCoordinator`].

pub mod colleges;
pub mod cutoffs;
pub mod dashboard;
pub mod news;
pub mod placements;

pub use colleges::{CollegeQuery, CollegeSort, Colleges};
pub use cutoffs::{CutoffBatch, CutoffItem, CutoffQuery, Cutoffs};
pub use dashboard::{CategoryCount, CollegeTypeStats, Dashboard, DashboardStats, TypeCount};
pub use news::{News, NewsQuery};
pub use placements::{PlacementYears, Placements, ReportKind};

use crate::caching::{CacheManager, EntityType, InvalidationCoordinator, InvalidationReport, KeyBuilder, TtlConfig, TtlPolicy};
use crate::core::error::{ServiceError, ServiceResult};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Years accepted for placement and cutoff records
pub const YEAR_RANGE: RangeInclusive<i64> = 2000..=2030;

/// Largest page any listing returns
pub const MAX_PAGE_SIZE: usize = 100;

/// Dependencies shared by the catalog services
#[derive(Clone)]
pub struct CatalogContext {
    pub store: Arc<dyn Store>,
    pub cache: Arc<CacheManager>,
    pub invalidation: Arc<InvalidationCoordinator>,
    pub ttl: TtlConfig,
}

impl CatalogContext {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<CacheManager>,
        invalidation: Arc<InvalidationCoordinator>,
        ttl: TtlConfig,
    ) -> Self {
        Self {
            store,
            cache,
            invalidation,
            ttl,
        }
    }

    /// Key builder honouring the configured key length limit
    pub(crate) fn key(&self, namespace: &str) -> KeyBuilder {
        KeyBuilder::new(namespace).with_max_length(self.cache.config().max_key_length)
    }

    /// Reject a slug whose longest dependent key cannot be built
    pub(crate) fn ensure_keyable(&self, field: &str, longest: KeyBuilder) -> ServiceResult<()> {
        longest.build().map(|_| ()).map_err(|_| {
            ServiceError::validation(
                field,
                format!("too long; cache keys are limited to {} bytes", self.cache.config().max_key_length),
            )
        })
    }

    pub(crate) async fn cached<T, F, Fut>(&self, key: &str, ttl: TtlPolicy, fetch: F) -> ServiceResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        self.cache.get_or_fetch(key, ttl, fetch).await
    }

    pub(crate) async fn invalidate(&self, entity: EntityType, key: Option<&str>) -> InvalidationReport {
        self.invalidation.on_write(entity, key).await
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: usize, limit: usize) -> Self {
        let total_pages = if limit == 0 { 0 } else { (total + limit as u64 - 1) / limit as u64 };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Page number and size from optional raw values; the size is capped
pub(crate) fn page_window(page: Option<usize>, limit: Option<usize>, default_limit: usize) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

/// Non-empty trimmed string field of a document
pub(crate) fn required_str(doc: &Value, field: &str) -> ServiceResult<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::validation(field, "is required"))
}

/// Year given as a number or numeric string, within [`YEAR_RANGE`]
pub(crate) fn parse_year(value: Option<&Value>) -> ServiceResult<i32> {
    let year = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match year {
        Some(year) if YEAR_RANGE.contains(&year) => Ok(year as i32),
        Some(_) => Err(ServiceError::validation(
            "year",
            format!("must be between {} and {}", YEAR_RANGE.start(), YEAR_RANGE.end()),
        )),
        None => Err(ServiceError::validation("year", "is required")),
    }
}

pub(crate) fn check_year(year: i32) -> ServiceResult<i32> {
    parse_year(Some(&Value::from(year)))
}

/// `_id` of a stored document as a string
pub(crate) fn document_id(doc: &Value) -> ServiceResult<String> {
    doc.get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::store("stored document has no _id"))
}
