//! College profiles: cached detail and listing reads, writes with
//! invalidation.

use super::{page_window, required_str, CatalogContext, Page};
use crate::caching::EntityType;
use crate::core::error::{ServiceError, ServiceResult};
use crate::store::{collections, Document, Filter, FindOptions, SortOrder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Sortable college fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollegeSort {
    Name,
    Nirf,
    Fees,
    AvgSalary,
    PlacementRate,
}

impl CollegeSort {
    fn field(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Nirf => "nirf",
            Self::Fees => "fees",
            Self::AvgSalary => "avgSalary",
            Self::PlacementRate => "placementRate",
        }
    }
}

/// Listing filters; empty lists do not filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollegeQuery {
    /// Matched against name, location and slug, ignoring case
    pub search: Option<String>,
    pub states: Vec<String>,
    pub institute_types: Vec<String>,
    pub tags: Vec<String>,
    pub min_fees: Option<f64>,
    pub max_fees: Option<f64>,
    pub min_placement_rate: Option<f64>,
    pub sort: Option<CollegeSort>,
    pub descending: bool,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl CollegeQuery {
    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    fn filter(&self) -> Filter {
        let mut filters = Vec::new();
        if let Some(term) = self.search_term() {
            filters.push(Filter::or(vec![
                Filter::contains("name", &term),
                Filter::contains("location", &term),
                Filter::contains("slug", &term),
            ]));
        }
        if !self.states.is_empty() {
            filters.push(Filter::in_values("state", self.states.iter().map(String::as_str)));
        }
        if !self.institute_types.is_empty() {
            filters.push(Filter::in_values("instituteType", self.institute_types.iter().map(String::as_str)));
        }
        if !self.tags.is_empty() {
            filters.push(Filter::in_values("tag", self.tags.iter().map(String::as_str)));
        }
        if let Some(min) = self.min_fees {
            filters.push(Filter::gte("fees", min));
        }
        if let Some(max) = self.max_fees {
            filters.push(Filter::lte("fees", max));
        }
        if let Some(rate) = self.min_placement_rate {
            filters.push(Filter::gte("placementRate", rate));
        }
        Filter::and(filters)
    }
}

/// College profile service
#[derive(Clone)]
pub struct Colleges {
    ctx: CatalogContext,
}

impl Colleges {
    pub fn new(ctx: CatalogContext) -> Self {
        Self { ctx }
    }

    fn detail_key(&self, slug: &str) -> ServiceResult<String> {
        Ok(self.ctx.key("college").part("slug").part(slug).build()?)
    }

    /// College by slug
    pub async fn get(&self, slug: &str) -> ServiceResult<Document> {
        let key = self.detail_key(slug)?;
        self.ctx
            .cached(&key, self.ctx.ttl.detail, || async {
                self.ctx
                    .store
                    .find_one(collections::COLLEGES, &Filter::eq("slug", slug))
                    .await?
                    .ok_or_else(|| ServiceError::not_found("college", slug))
            })
            .await
    }

    /// Filtered, sorted page of colleges
    pub async fn list(&self, query: &CollegeQuery) -> ServiceResult<Page<Document>> {
        let (page, limit) = page_window(query.page, query.limit, 10);
        let key = self
            .ctx
            .key("colleges")
            .part("list")
            .param_opt("q", query.search_term())
            .param_list("state", &query.states)
            .param_list("type", &query.institute_types)
            .param_list("tag", &query.tags)
            .param_opt("minFees", query.min_fees)
            .param_opt("maxFees", query.max_fees)
            .param_opt("minRate", query.min_placement_rate)
            .param_opt("sort", query.sort.map(|s| s.field()))
            .param("desc", query.descending)
            .param("page", page)
            .param("limit", limit)
            .build()?;

        self.ctx
            .cached(&key, self.ctx.ttl.listing, || async {
                let filter = query.filter();
                let order = if query.descending {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                };
                let options = FindOptions::new()
                    .sort_by(query.sort.unwrap_or(CollegeSort::Name).field(), order)
                    .sort_by("slug", SortOrder::Ascending)
                    .skip((page - 1) * limit)
                    .limit(limit);

                let total = self.ctx.store.count_documents(collections::COLLEGES, &filter).await?;
                let items = self.ctx.store.find(collections::COLLEGES, &filter, &options).await?;
                Ok::<_, ServiceError>(Page::new(items, total, page, limit))
            })
            .await
    }

    /// Create a college; the slug must be unused
    pub async fn create(&self, doc: Document) -> ServiceResult<Document> {
        let slug = required_str(&doc, "slug")?;
        required_str(&doc, "name")?;
        self.ensure_slug_keyable(&slug)?;
        self.ensure_slug_free(&slug).await?;

        let mut doc = doc;
        if let Value::Object(map) = &mut doc {
            map.insert("slug".to_string(), Value::String(slug.clone()));
            map.entry("availablePlacementReports")
                .or_insert_with(|| Value::Array(Vec::new()));
        }

        let created = self.ctx.store.insert(collections::COLLEGES, doc).await?;
        self.ctx.invalidate(EntityType::College, Some(&slug)).await;
        info!("Created college {}", slug);
        Ok(created)
    }

    /// Merge `patch` into the college; a slug change must not collide
    pub async fn update(&self, slug: &str, patch: Document) -> ServiceResult<Document> {
        let new_slug = patch
            .get("slug")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| *s != slug)
            .map(str::to_string);
        if let Some(new_slug) = &new_slug {
            if new_slug.is_empty() {
                return Err(ServiceError::validation("slug", "cannot be empty"));
            }
            self.ensure_slug_keyable(new_slug)?;
            self.ensure_slug_free(new_slug).await?;
        }

        let updated = self
            .ctx
            .store
            .update_one(collections::COLLEGES, &Filter::eq("slug", slug), patch)
            .await?
            .ok_or_else(|| ServiceError::not_found("college", slug))?;

        self.ctx.invalidate(EntityType::College, Some(slug)).await;
        if let Some(new_slug) = &new_slug {
            self.ctx.invalidate(EntityType::College, Some(new_slug)).await;
        }
        Ok(updated)
    }

    pub async fn delete(&self, slug: &str) -> ServiceResult<Document> {
        let removed = self
            .ctx
            .store
            .delete_one(collections::COLLEGES, &Filter::eq("slug", slug))
            .await?
            .ok_or_else(|| ServiceError::not_found("college", slug))?;
        self.ctx.invalidate(EntityType::College, Some(slug)).await;
        info!("Deleted college {}", slug);
        Ok(removed)
    }

    // placementStats:college:{slug} is the longest key a college slug appears in
    fn ensure_slug_keyable(&self, slug: &str) -> ServiceResult<()> {
        self.ctx
            .ensure_keyable("slug", self.ctx.key("placementStats").part("college").part(slug))
    }

    async fn ensure_slug_free(&self, slug: &str) -> ServiceResult<()> {
        let exists = self
            .ctx
            .store
            .count_documents(collections::COLLEGES, &Filter::eq("slug", slug))
            .await?
            > 0;
        if exists {
            return Err(ServiceError::validation("slug", format!("college '{}' already exists", slug)));
        }
        Ok(())
    }
}
