//! Dashboard aggregates.

use super::CatalogContext;
use crate::core::error::{ServiceError, ServiceResult};
use crate::store::{collections, Filter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CATEGORY_FIELDS: [&str; 3] = ["instituteType", "tag", "stream"];
const ENGINEERING: &[&str] = &["engineering"];
const MEDICAL: &[&str] = &["medical"];
const MANAGEMENT: &[&str] = &["management", "mba", "business"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub count: u64,
    /// Share of all colleges, one decimal
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_colleges: u64,
    pub engineering: CategoryCount,
    pub medical: CategoryCount,
    pub management: CategoryCount,
    /// Colleges in none of the other categories
    pub others: CategoryCount,
    pub total_news: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    /// `None` for colleges without an institute type
    pub institute_type: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeTypeStats {
    /// Most common first
    pub college_types: Vec<TypeCount>,
    pub total: u64,
    pub last_updated: DateTime<Utc>,
}

/// Colleges whose category fields mention any of `terms`
fn category_filter(terms: &[&str]) -> Filter {
    Filter::or(
        CATEGORY_FIELDS
            .iter()
            .flat_map(|field| terms.iter().map(move |term| Filter::contains(field, term)))
            .collect(),
    )
}

fn share(count: u64, total: u64) -> CategoryCount {
    let percentage = if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64 * 1000.0).round() / 10.0
    };
    CategoryCount { count, percentage }
}

#[derive(Clone)]
pub struct Dashboard {
    ctx: CatalogContext,
}

impl Dashboard {
    pub fn new(ctx: CatalogContext) -> Self {
        Self { ctx }
    }

    pub async fn stats(&self) -> ServiceResult<DashboardStats> {
        let key = self.ctx.key("dashboard").part("stats").build()?;
        self.ctx
            .cached(&key, self.ctx.ttl.dashboard, || self.compute_stats())
            .await
    }

    async fn compute_stats(&self) -> ServiceResult<DashboardStats> {
        let store = &self.ctx.store;
        let all_terms: Vec<&str> = ENGINEERING.iter().chain(MEDICAL).chain(MANAGEMENT).copied().collect();
        let everything = Filter::All;
        let engineering_filter = category_filter(ENGINEERING);
        let medical_filter = category_filter(MEDICAL);
        let management_filter = category_filter(MANAGEMENT);
        let others_filter = Filter::not(category_filter(&all_terms));

        let (total, engineering, medical, management, others, news) = futures::try_join!(
            store.count_documents(collections::COLLEGES, &everything),
            store.count_documents(collections::COLLEGES, &engineering_filter),
            store.count_documents(collections::COLLEGES, &medical_filter),
            store.count_documents(collections::COLLEGES, &management_filter),
            store.count_documents(collections::COLLEGES, &others_filter),
            store.count_documents(collections::NEWS, &everything),
        )?;

        Ok(DashboardStats {
            total_colleges: total,
            engineering: share(engineering, total),
            medical: share(medical, total),
            management: share(management, total),
            others: share(others, total),
            total_news: news,
        })
    }

    /// Colleges per institute type
    pub async fn college_types(&self) -> ServiceResult<CollegeTypeStats> {
        let key = self.ctx.key("dashboard").part("college-types").build()?;
        self.ctx
            .cached(&key, self.ctx.ttl.dashboard, || async {
                let groups = self
                    .ctx
                    .store
                    .aggregate_group(collections::COLLEGES, &Filter::All, "instituteType")
                    .await?;
                let college_types: Vec<TypeCount> = groups
                    .into_iter()
                    .map(|g| TypeCount {
                        institute_type: match g.key {
                            Value::String(s) => Some(s),
                            Value::Null => None,
                            other => Some(other.to_string()),
                        },
                        count: g.count,
                    })
                    .collect();
                Ok::<_, ServiceError>(CollegeTypeStats {
                    total: college_types.iter().map(|t| t.count).sum(),
                    college_types,
                    last_updated: Utc::now(),
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_share_rounds_to_one_decimal() {
        assert_eq!(share(1, 3).percentage, 33.3);
        assert_eq!(share(2, 3).percentage, 66.7);
        assert_eq!(share(0, 0).percentage, 0.0);
    }

    #[test]
    fn test_category_filter() {
        let management = category_filter(MANAGEMENT);
        assert!(management.matches(&json!({"stream": "MBA"})));
        assert!(management.matches(&json!({"tag": "Business School"})));
        assert!(!management.matches(&json!({"instituteType": "Engineering"})));
    }
}
