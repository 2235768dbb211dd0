//! Placement reports, placement statistics and top recruiters, plus the
//! list of report years kept on each college.
//!
//! Creating a report registers its year on the parent college. That cascade
//! is all or nothing: when the registration fails the new report is deleted
//! again and the failure is returned as a dependency error.

use super::{check_year, document_id, parse_year, CatalogContext};
use crate::caching::EntityType;
use crate::core::error::{ServiceError, ServiceResult};
use crate::store::{collections, Document, Filter, FindOptions, SortOrder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{error, info};

/// College field holding the report years, newest first
pub const YEARS_FIELD: &str = "availablePlacementReports";

/// Field linking a report to its college
pub const COLLEGE_FIELD: &str = "collegeSlug";

/// Per-college report families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportKind {
    Placement,
    PlacementStats,
    TopRecruiter,
}

impl ReportKind {
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Placement => collections::PLACEMENTS,
            Self::PlacementStats => collections::PLACEMENT_STATS,
            Self::TopRecruiter => collections::TOP_RECRUITERS,
        }
    }

    pub fn entity(&self) -> EntityType {
        match self {
            Self::Placement => EntityType::Placement,
            Self::PlacementStats => EntityType::PlacementStats,
            Self::TopRecruiter => EntityType::TopRecruiter,
        }
    }
}

/// Report years registered on colleges
#[derive(Clone)]
pub struct PlacementYears {
    ctx: CatalogContext,
}

impl PlacementYears {
    pub fn new(ctx: CatalogContext) -> Self {
        Self { ctx }
    }

    async fn years_of(&self, slug: &str) -> ServiceResult<Vec<i32>> {
        let college = self
            .ctx
            .store
            .find_one(collections::COLLEGES, &Filter::eq("slug", slug))
            .await?
            .ok_or_else(|| ServiceError::not_found("college", slug))?;

        Ok(college
            .get(YEARS_FIELD)
            .and_then(Value::as_array)
            .map(|years| years.iter().filter_map(Value::as_i64).map(|y| y as i32).collect())
            .unwrap_or_default())
    }

    async fn store_years(&self, slug: &str, years: BTreeSet<i32>) -> ServiceResult<()> {
        let newest_first: Vec<i32> = years.into_iter().rev().collect();
        self.ctx
            .store
            .update_one(
                collections::COLLEGES,
                &Filter::eq("slug", slug),
                serde_json::json!({ YEARS_FIELD: newest_first }),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("college", slug))?;
        self.ctx.invalidate(EntityType::College, Some(slug)).await;
        Ok(())
    }

    /// Report years of a college, newest first
    pub async fn list(&self, slug: &str) -> ServiceResult<Vec<i32>> {
        let mut years = self.years_of(slug).await?;
        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        Ok(years)
    }

    /// Register a year; false when it was already present
    pub async fn add(&self, slug: &str, year: i32) -> ServiceResult<bool> {
        Ok(!self.add_all(slug, &BTreeSet::from([year])).await?.is_empty())
    }

    /// Register several years in a single college write. Returns the years
    /// that were not present yet; on error none of them were written.
    pub async fn add_all(&self, slug: &str, years: &BTreeSet<i32>) -> ServiceResult<Vec<i32>> {
        for year in years {
            check_year(*year)?;
        }
        let mut current: BTreeSet<i32> = self.years_of(slug).await?.into_iter().collect();
        let added: Vec<i32> = years.iter().copied().filter(|year| current.insert(*year)).collect();
        if added.is_empty() {
            return Ok(added);
        }
        self.store_years(slug, current).await?;
        info!("Added report years {:?} to {}", added, slug);
        Ok(added)
    }

    /// Unregister a year; false when it was not present
    pub async fn remove(&self, slug: &str, year: i32) -> ServiceResult<bool> {
        let year = check_year(year)?;
        let mut years: BTreeSet<i32> = self.years_of(slug).await?.into_iter().collect();
        if !years.remove(&year) {
            return Ok(false);
        }
        self.store_years(slug, years).await?;
        info!("Removed report year {} from {}", year, slug);
        Ok(true)
    }
}

/// Placement-family reports
#[derive(Clone)]
pub struct Placements {
    ctx: CatalogContext,
    years: PlacementYears,
}

impl Placements {
    pub fn new(ctx: CatalogContext) -> Self {
        Self {
            years: PlacementYears::new(ctx.clone()),
            ctx,
        }
    }

    pub fn years(&self) -> &PlacementYears {
        &self.years
    }

    fn college_key(&self, kind: ReportKind, slug: &str) -> ServiceResult<String> {
        let builder = match kind {
            ReportKind::Placement => self.ctx.key("placement").part("college").part(slug),
            ReportKind::PlacementStats => self.ctx.key("placementStats").part("college").part(slug),
            ReportKind::TopRecruiter => self.ctx.key("topRecruiters").part(slug).part("all"),
        };
        Ok(builder.build()?)
    }

    async fn ensure_college(&self, slug: &str) -> ServiceResult<()> {
        let count = self
            .ctx
            .store
            .count_documents(collections::COLLEGES, &Filter::eq("slug", slug))
            .await?;
        if count == 0 {
            return Err(ServiceError::not_found("college", slug));
        }
        Ok(())
    }

    fn prepare(slug: &str, doc: Document) -> ServiceResult<(Document, i32)> {
        let year = parse_year(doc.get("year"))?;
        let Value::Object(mut map) = doc else {
            return Err(ServiceError::validation("body", "must be an object"));
        };
        map.insert(COLLEGE_FIELD.to_string(), Value::String(slug.to_string()));
        map.insert("year".to_string(), Value::from(year));
        Ok((Value::Object(map), year))
    }

    /// Register `years` on the college, deleting `created` when that fails
    async fn register_years(
        &self,
        kind: ReportKind,
        slug: &str,
        years: BTreeSet<i32>,
        created: &[Document],
    ) -> ServiceResult<()> {
        let Err(e) = self.years.add_all(slug, &years).await else {
            return Ok(());
        };

        error!("Registering years {:?} on {} failed, rolling back: {}", years, slug, e);
        for doc in created {
            let id = match document_id(doc) {
                Ok(id) => id,
                Err(missing) => {
                    error!("Rollback skipped a {} document: {}", kind.collection(), missing);
                    continue;
                }
            };
            if let Err(rollback) = self
                .ctx
                .store
                .delete_one(kind.collection(), &Filter::eq("_id", id.as_str()))
                .await
            {
                error!("Rollback of {} {} failed: {}", kind.collection(), id, rollback);
            }
        }
        // Reads between insert and rollback may have cached the reports
        self.ctx.invalidate(kind.entity(), Some(slug)).await;

        Err(ServiceError::dependency_update(format!(
            "failed to register years {:?} on college '{}': {}",
            years, slug, e
        )))
    }

    /// Create one report under a college
    pub async fn create(&self, kind: ReportKind, slug: &str, doc: Document) -> ServiceResult<Document> {
        let (doc, year) = Self::prepare(slug, doc)?;
        self.ensure_college(slug).await?;

        let created = self.ctx.store.insert(kind.collection(), doc).await?;
        self.register_years(kind, slug, BTreeSet::from([year]), std::slice::from_ref(&created))
            .await?;

        self.ctx.invalidate(kind.entity(), Some(slug)).await;
        info!("Created {} for {} ({})", kind.collection(), slug, year);
        Ok(created)
    }

    /// Create several reports; every entry needs a valid year
    pub async fn create_many(&self, kind: ReportKind, slug: &str, docs: Vec<Document>) -> ServiceResult<Vec<Document>> {
        if docs.is_empty() {
            return Err(ServiceError::validation("body", "must be a non-empty array"));
        }

        let mut prepared = Vec::with_capacity(docs.len());
        let mut years = BTreeSet::new();
        for (index, doc) in docs.into_iter().enumerate() {
            let (doc, year) = Self::prepare(slug, doc)
                .map_err(|e| ServiceError::validation(format!("[{}].year", index), e.to_string()))?;
            years.insert(year);
            prepared.push(doc);
        }
        self.ensure_college(slug).await?;

        let created = self.ctx.store.insert_many(kind.collection(), prepared).await?;
        self.register_years(kind, slug, years, &created).await?;

        self.ctx.invalidate(kind.entity(), Some(slug)).await;
        Ok(created)
    }

    /// All reports of a college, newest year first
    pub async fn for_college(&self, kind: ReportKind, slug: &str) -> ServiceResult<Vec<Document>> {
        let key = self.college_key(kind, slug)?;
        self.ctx
            .cached(&key, self.ctx.ttl.detail, || async {
                self.ensure_college(slug).await?;
                let options = FindOptions::new().sort_by("year", SortOrder::Descending);
                let docs = self
                    .ctx
                    .store
                    .find(kind.collection(), &Filter::eq(COLLEGE_FIELD, slug), &options)
                    .await?;
                Ok::<_, ServiceError>(docs)
            })
            .await
    }

    /// Reports of one year, sliced from the cached per-college list
    pub async fn for_year(&self, kind: ReportKind, slug: &str, year: i32) -> ServiceResult<Vec<Document>> {
        let docs = self.for_college(kind, slug).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.get("year").and_then(Value::as_i64) == Some(i64::from(year)))
            .collect())
    }

    /// Top recruiters of one year
    pub async fn top_recruiters(&self, slug: &str, year: i32) -> ServiceResult<Document> {
        let year = check_year(year)?;
        let key = self.ctx.key("topRecruiters").part(slug).part(year).build()?;
        self.ctx
            .cached(&key, self.ctx.ttl.detail, || async {
                let filter = Filter::and(vec![Filter::eq(COLLEGE_FIELD, slug), Filter::eq("year", year)]);
                self.ctx
                    .store
                    .find_one(collections::TOP_RECRUITERS, &filter)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("top recruiters", format!("{}/{}", slug, year)))
            })
            .await
    }

    /// Merge `patch` into a report. The owning college cannot change; a new
    /// year is registered on it before the report is written, so a failed
    /// registration leaves the report untouched.
    pub async fn update(&self, kind: ReportKind, id: &str, patch: Document) -> ServiceResult<Document> {
        let Value::Object(mut patch) = patch else {
            return Err(ServiceError::validation("body", "must be an object"));
        };
        patch.remove(COLLEGE_FIELD);
        let year = match patch.get("year") {
            Some(value) => Some(parse_year(Some(value))?),
            None => None,
        };
        if let Some(year) = year {
            patch.insert("year".to_string(), Value::from(year));
        }

        let current = self
            .ctx
            .store
            .find_one(kind.collection(), &Filter::eq("_id", id))
            .await?
            .ok_or_else(|| ServiceError::not_found(kind.collection(), id))?;
        let slug = current.get(COLLEGE_FIELD).and_then(Value::as_str).map(str::to_string);

        let mut registered = None;
        if let (Some(slug), Some(year)) = (&slug, year) {
            let added = self
                .years
                .add(slug, year)
                .await
                .map_err(|e| ServiceError::dependency_update(format!("failed to register year {}: {}", year, e)))?;
            if added {
                registered = Some((slug.as_str(), year));
            }
        }

        let updated = match self
            .ctx
            .store
            .update_one(kind.collection(), &Filter::eq("_id", id), Value::Object(patch))
            .await
        {
            Ok(Some(updated)) => updated,
            outcome => {
                if let Some((slug, year)) = registered {
                    if let Err(e) = self.years.remove(slug, year).await {
                        error!("Unregistering year {} from {} failed: {}", year, slug, e);
                    }
                }
                return Err(match outcome {
                    Err(e) => e.into(),
                    _ => ServiceError::not_found(kind.collection(), id),
                });
            }
        };

        self.ctx.invalidate(kind.entity(), slug.as_deref()).await;
        Ok(updated)
    }

    pub async fn delete(&self, kind: ReportKind, id: &str) -> ServiceResult<Document> {
        let removed = self
            .ctx
            .store
            .delete_one(kind.collection(), &Filter::eq("_id", id))
            .await?
            .ok_or_else(|| ServiceError::not_found(kind.collection(), id))?;
        let slug = removed.get(COLLEGE_FIELD).and_then(Value::as_str);
        self.ctx.invalidate(kind.entity(), slug).await;
        Ok(removed)
    }
}
