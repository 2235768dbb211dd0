//! Prediction engine: store reads, the pipeline and result caching.

use super::pipeline::{filter_quota, group_rows, paginate, post_filter, score_groups, select_groups, sort_results};
use super::quota::QuotaPolicy;
use super::{
    CollegeProfile, EligibilityRow, PredictParams, PredictRequest, PredictionPage, PredictionResult, PredictorConfig,
    SEAT_TYPES, SUB_CATEGORIES,
};
use crate::caching::{CacheManager, TtlPolicy};
use crate::core::error::ServiceResult;
use crate::observability::metrics;
use crate::store::{collections, Filter, FindOptions, Store};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Ranks programmes for a candidate, cache-aside over the two-tier cache
pub struct Predictor {
    store: Arc<dyn Store>,
    cache: Arc<CacheManager>,
    config: PredictorConfig,
    ttl: TtlPolicy,
    quota: QuotaPolicy,
}

impl Predictor {
    pub fn new(store: Arc<dyn Store>, cache: Arc<CacheManager>, config: PredictorConfig, ttl: TtlPolicy) -> Self {
        Self {
            store,
            cache,
            config,
            ttl,
            quota: QuotaPolicy::standard(),
        }
    }

    pub fn with_quota_policy(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Validate raw parameters and predict
    pub async fn predict(&self, params: &PredictParams) -> ServiceResult<PredictionPage> {
        let request = params.validate(&self.config)?;
        self.predict_request(&request).await
    }

    /// One page of the ranked list for `request`. The full list is cached
    /// under a key that ignores pagination.
    pub async fn predict_request(&self, request: &PredictRequest) -> ServiceResult<PredictionPage> {
        let start = Instant::now();
        let key = request.cache_key(self.cache.config().max_key_length)?;

        let ranked: ServiceResult<Vec<PredictionResult>> = self
            .cache
            .get_or_fetch(&key, self.ttl, || self.rank_all(request))
            .await;

        match ranked {
            Ok(ranked) => {
                metrics::record_prediction(start.elapsed(), Some(ranked.len()));
                Ok(paginate(&ranked, request.page, request.page_size))
            }
            Err(e) => {
                metrics::record_prediction(start.elapsed(), None);
                Err(e)
            }
        }
    }

    /// Run the whole pipeline against the store
    async fn rank_all(&self, request: &PredictRequest) -> ServiceResult<Vec<PredictionResult>> {
        let rows = self.fetch_rows(request).await?;
        let fetched = rows.len();

        let rows = filter_quota(rows, &self.quota, request.home_state.as_deref());
        let groups = group_rows(rows);
        let selected = select_groups(groups, request.rank, request.mode);

        let slugs: BTreeSet<&str> = selected.iter().map(|s| s.group.slug.as_str()).collect();
        let profiles = self.fetch_profiles(slugs.into_iter()).await?;

        let scored = score_groups(selected, request.rank, &profiles, self.config.default_weight);
        let results = post_filter(sort_results(scored), request.tag.as_deref(), request.fees_ceiling);

        info!(
            exam = %request.exam_type,
            rank = request.rank,
            mode = %request.mode,
            rows = fetched,
            results = results.len(),
            "Prediction computed"
        );
        Ok(results)
    }

    /// Every matching row, read page by page until a short page. Pages are
    /// read in sequence; any failure aborts the whole read.
    async fn fetch_rows(&self, request: &PredictRequest) -> ServiceResult<Vec<EligibilityRow>> {
        let mut filters = vec![
            Filter::eq("examType", request.exam_type.as_str()),
            Filter::in_values("seatType", SEAT_TYPES.labels(&request.seat_type)),
            Filter::in_values("subCategory", SUB_CATEGORIES.labels(&request.sub_category)),
        ];
        if let Some(years) = &self.config.years {
            filters.push(Filter::in_values("year", years.iter().copied()));
        }
        let filter = Filter::and(filters);

        let batch_size = self.config.batch_size.max(1);
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            let page = self
                .store
                .range_fetch(collections::CUTOFFS, &filter, offset, batch_size)
                .await
                .map_err(|e| crate::store_error!("cutoff read failed at offset {}: {}", offset, e))?;
            let page_len = page.len();

            for doc in page {
                match serde_json::from_value::<EligibilityRow>(doc) {
                    Ok(row) => rows.push(row),
                    Err(e) => warn!("Skipping malformed cutoff row: {}", e),
                }
            }

            if page_len < batch_size {
                break;
            }
            offset += page_len;
        }

        debug!("Fetched {} eligibility rows in batches of {}", rows.len(), batch_size);
        Ok(rows)
    }

    async fn fetch_profiles<'a>(
        &self,
        slugs: impl Iterator<Item = &'a str>,
    ) -> ServiceResult<HashMap<String, CollegeProfile>> {
        let slugs: Vec<&str> = slugs.collect();
        if slugs.is_empty() {
            return Ok(HashMap::new());
        }

        let options = FindOptions::new().project(&[
            "slug",
            "name",
            "location",
            "state",
            "nirf",
            "fees",
            "instituteType",
            "collegeWeight",
        ]);
        let docs = self
            .store
            .find(collections::COLLEGES, &Filter::in_values("slug", slugs), &options)
            .await?;

        Ok(docs
            .iter()
            .filter_map(CollegeProfile::from_document)
            .map(|profile| (profile.slug.clone(), profile))
            .collect())
    }
}
