//! Admission cutoffs: bulk upload, cached filtered listing, update and delete.
//! Every write also clears the predictor cache through the dependency table.

use super::{check_year, parse_year, CatalogContext};
use crate::caching::EntityType;
use crate::core::error::{ServiceError, ServiceResult};
use crate::predictor::EligibilityRow;
use crate::store::{collections, Document, Filter, FindOptions, SortOrder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Per-row fields of a bulk upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CutoffItem {
    pub course: String,
    pub branch: String,
    pub round: String,
    pub quota: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub opening_rank: Option<u64>,
    #[serde(default)]
    pub closing_rank: Option<u64>,
    #[serde(default)]
    pub branch_weight: Option<f64>,
}

/// Bulk upload: shared fields plus one item per row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CutoffBatch {
    pub exam_type: String,
    pub year: i32,
    pub slug: String,
    pub seat_type: String,
    pub sub_category: String,
    pub cutoffs: Vec<CutoffItem>,
}

impl CutoffBatch {
    fn validate(&self) -> ServiceResult<()> {
        if self.cutoffs.is_empty() {
            return Err(ServiceError::validation("cutoffs", "must be a non-empty array"));
        }
        for (field, value) in [
            ("examType", &self.exam_type),
            ("slug", &self.slug),
            ("seatType", &self.seat_type),
            ("subCategory", &self.sub_category),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::validation(field, "is required"));
            }
        }
        check_year(self.year)?;
        Ok(())
    }

    fn into_documents(self) -> ServiceResult<Vec<Document>> {
        let CutoffBatch {
            exam_type,
            year,
            slug,
            seat_type,
            sub_category,
            cutoffs,
        } = self;

        cutoffs
            .into_iter()
            .map(|item| -> ServiceResult<Document> {
                let row = EligibilityRow {
                    slug: slug.clone(),
                    course: item.course,
                    branch: item.branch,
                    round: item.round,
                    year,
                    seat_type: seat_type.clone(),
                    sub_category: sub_category.clone(),
                    quota: item.quota,
                    state: item.state,
                    opening_rank: item.opening_rank,
                    closing_rank: item.closing_rank,
                    branch_weight: item.branch_weight,
                };
                let mut doc = serde_json::to_value(row)?;
                if let Value::Object(map) = &mut doc {
                    map.insert("examType".to_string(), Value::String(exam_type.clone()));
                }
                Ok(doc)
            })
            .collect()
    }
}

/// Listing filters; unset fields do not filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CutoffQuery {
    pub exam_type: Option<String>,
    pub year: Option<i32>,
    pub slug: Option<String>,
    pub seat_type: Option<String>,
    pub sub_category: Option<String>,
    pub round: Option<String>,
}

impl CutoffQuery {
    fn filter(&self) -> Filter {
        let text = [
            ("examType", &self.exam_type),
            ("slug", &self.slug),
            ("seatType", &self.seat_type),
            ("subCategory", &self.sub_category),
            ("round", &self.round),
        ];
        let mut filters: Vec<Filter> = text
            .into_iter()
            .filter_map(|(field, value)| value.as_deref().map(|v| Filter::eq(field, v)))
            .collect();
        if let Some(year) = self.year {
            filters.push(Filter::eq("year", year));
        }
        Filter::and(filters)
    }
}

#[derive(Clone)]
pub struct Cutoffs {
    ctx: CatalogContext,
}

impl Cutoffs {
    pub fn new(ctx: CatalogContext) -> Self {
        Self { ctx }
    }

    /// Insert every row of a batch; returns the stored documents
    pub async fn create_bulk(&self, batch: CutoffBatch) -> ServiceResult<Vec<Document>> {
        batch.validate()?;
        let slug = batch.slug.trim().to_string();
        let docs = batch.into_documents()?;

        let created = self.ctx.store.insert_many(collections::CUTOFFS, docs).await?;
        self.ctx.invalidate(EntityType::Cutoff, Some(&slug)).await;
        info!("Stored {} cutoffs for {}", created.len(), slug);
        Ok(created)
    }

    /// Matching cutoffs, newest year first
    pub async fn list(&self, query: &CutoffQuery) -> ServiceResult<Vec<Document>> {
        let key = self
            .ctx
            .key("cutoffs")
            .part("list")
            .param_opt("exam", query.exam_type.as_deref())
            .param_opt("year", query.year)
            .param_opt("slug", query.slug.as_deref())
            .param_opt("seat", query.seat_type.as_deref())
            .param_opt("sub", query.sub_category.as_deref())
            .param_opt("round", query.round.as_deref())
            .build()?;

        self.ctx
            .cached(&key, self.ctx.ttl.listing, || async {
                let options = FindOptions::new()
                    .sort_by("year", SortOrder::Descending)
                    .sort_by("slug", SortOrder::Ascending)
                    .sort_by("round", SortOrder::Ascending);
                let docs = self.ctx.store.find(collections::CUTOFFS, &query.filter(), &options).await?;
                Ok::<_, ServiceError>(docs)
            })
            .await
    }

    pub async fn update(&self, id: &str, patch: Document) -> ServiceResult<Document> {
        if patch.get("year").is_some() {
            parse_year(patch.get("year"))?;
        }
        let updated = self
            .ctx
            .store
            .update_one(collections::CUTOFFS, &Filter::eq("_id", id), patch)
            .await?
            .ok_or_else(|| ServiceError::not_found("cutoff", id))?;
        let slug = updated.get("slug").and_then(Value::as_str);
        self.ctx.invalidate(EntityType::Cutoff, slug).await;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<Document> {
        let removed = self
            .ctx
            .store
            .delete_one(collections::CUTOFFS, &Filter::eq("_id", id))
            .await?
            .ok_or_else(|| ServiceError::not_found("cutoff", id))?;
        let slug = removed.get("slug").and_then(Value::as_str);
        self.ctx.invalidate(EntityType::Cutoff, slug).await;
        Ok(removed)
    }
}
