//! # Predictor Module
//!
//! Ranks college programmes for a candidate rank. Eligibility rows are read
//! from the store in batches, filtered by quota, grouped per
//! `(slug, course, branch)`, reduced to one representative round, scored,
//! sorted and paginated. The full ordered list is cached per parameter
//! combination so every page is sliced from the same ordering.

pub mod engine;
pub mod normalize;
pub mod pipeline;
pub mod quota;
pub mod rounds;

pub use engine::Predictor;
pub use normalize::{SynonymMap, SEAT_TYPES, SUB_CATEGORIES};
pub use pipeline::PredictionGroup;
pub use quota::{QuotaPolicy, QuotaRule};

use crate::caching::{CacheResult, KeyBuilder};
use crate::core::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Which admission rounds may be matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Standard rounds only
    #[default]
    Safe,
    /// Standard and supplementary rounds, with a fallback outside them
    Risk,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Safe => "safe",
            Mode::Risk => "risk",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Mode::Safe),
            "risk" => Ok(Mode::Risk),
            other => Err(ServiceError::validation(
                "mode",
                format!("'{}' is not one of safe, risk", other),
            )),
        }
    }
}

/// One cutoff data point as stored in the `cutoffs` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRow {
    pub slug: String,
    pub course: String,
    pub branch: String,
    pub round: String,
    pub year: i32,
    pub seat_type: String,
    pub sub_category: String,
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

#[cfg(test)]
impl EligibilityRow {
    pub(crate) fn sample(slug: &str, round: &str, year: i32, closing_rank: Option<u64>) -> Self {
        Self {
            slug: slug.to_string(),
            course: "B.Tech".to_string(),
            branch: "CSE".to_string(),
            round: round.to_string(),
            year,
            seat_type: "OPEN".to_string(),
            sub_category: "Gender-Neutral".to_string(),
            quota: "AI".to_string(),
            state: None,
            opening_rank: None,
            closing_rank,
            branch_weight: None,
        }
    }
}

/// College fields used to enrich results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollegeProfile {
    pub slug: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub state: Option<String>,
    pub nirf: Option<String>,
    pub fees: Option<f64>,
    pub institute_type: Option<String>,
    pub college_weight: Option<f64>,
}

impl CollegeProfile {
    /// Read a profile from a college document; `None` without a slug
    pub fn from_document(doc: &Value) -> Option<Self> {
        let text = |field: &str| match doc.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Some(Self {
            slug: doc.get("slug")?.as_str()?.to_string(),
            name: text("name"),
            location: text("location"),
            state: text("state"),
            nirf: text("nirf"),
            fees: doc.get("fees").and_then(parse_fee),
            institute_type: text("instituteType"),
            college_weight: doc.get("collegeWeight").and_then(parse_fee),
        })
    }
}

/// Numeric value of a field stored either as a number or a numeric string
/// (`"2,50,000"` included)
pub fn parse_fee(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
            digits.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// The round that matched a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativeRound {
    pub round: String,
    pub year: i32,
    pub closing_rank: u64,
    pub quota: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundCutoff {
    pub round: String,
    pub opening_rank: Option<u64>,
    pub closing_rank: u64,
}

/// Cutoffs of one year, rounds in counselling order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearCutoffs {
    pub year: i32,
    pub rounds: Vec<RoundCutoff>,
}

/// One ranked programme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub slug: String,
    pub course: String,
    pub branch: String,
    pub tag: String,
    pub college_name: Option<String>,
    pub location: Option<String>,
    pub state: Option<String>,
    pub nirf_rank: Option<String>,
    pub fees: Option<f64>,
    pub institute_type: Option<String>,
    pub representative: RepresentativeRound,
    /// Years newest first
    pub cutoffs: Vec<YearCutoffs>,
    pub rank_score: f64,
    pub final_score: f64,
    /// Matched outside the mode's rounds
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionPage {
    pub total_results: usize,
    pub page: usize,
    pub page_size: usize,
    pub results: Vec<PredictionResult>,
}

/// Predictor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Rows per paged store read
    pub batch_size: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Branch and college weight when the data has none
    pub default_weight: f64,
    /// Restrict rows to these years; all years when unset
    pub years: Option<Vec<i32>>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            default_page_size: 20,
            max_page_size: 100,
            default_weight: 70.0,
            years: None,
        }
    }
}

/// Raw predictor parameters as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictParams {
    pub rank: Option<i64>,
    #[serde(alias = "exam")]
    pub exam_type: Option<String>,
    pub seat_type: Option<String>,
    pub sub_category: Option<String>,
    #[serde(alias = "domicile")]
    pub home_state: Option<String>,
    pub mode: Option<String>,
    pub tag: Option<String>,
    pub fees_ceiling: Option<f64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PredictParams {
    /// Check required fields and ranges, normalising labels
    pub fn validate(&self, config: &PredictorConfig) -> ServiceResult<PredictRequest> {
        let rank = match self.rank {
            Some(rank) if rank > 0 => rank as u64,
            Some(_) => return Err(ServiceError::validation("rank", "must be a positive integer")),
            None => return Err(ServiceError::validation("rank", "is required")),
        };
        let exam_type = required("examType", &self.exam_type)?;
        let seat_type = SEAT_TYPES.canonical(&required("seatType", &self.seat_type)?);
        let sub_category = SUB_CATEGORIES.canonical(&required("subCategory", &self.sub_category)?);

        let mode = match non_empty(&self.mode) {
            Some(mode) => mode.parse()?,
            None => Mode::default(),
        };

        let fees_ceiling = match self.fees_ceiling {
            Some(fees) if !fees.is_finite() || fees < 0.0 => {
                return Err(ServiceError::validation("feesCeiling", "must be a non-negative number"))
            }
            other => other,
        };

        let page = match self.page {
            None => 1,
            Some(page) if page >= 1 => page as usize,
            Some(_) => return Err(ServiceError::validation("page", "must be at least 1")),
        };
        let page_size = match self.page_size {
            None => config.default_page_size,
            Some(size) if size >= 1 && size as usize <= config.max_page_size => size as usize,
            Some(_) => {
                return Err(ServiceError::validation(
                    "pageSize",
                    format!("must be between 1 and {}", config.max_page_size),
                ))
            }
        };

        Ok(PredictRequest {
            rank,
            exam_type,
            seat_type,
            sub_category,
            home_state: non_empty(&self.home_state),
            mode,
            tag: non_empty(&self.tag).map(|t| t.to_ascii_lowercase()),
            fees_ceiling,
            page,
            page_size,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(field: &str, value: &Option<String>) -> ServiceResult<String> {
    non_empty(value).ok_or_else(|| ServiceError::validation(field, "is required"))
}

/// Validated predictor request; seat type and sub-category are canonical
#[derive(Debug, Clone, PartialEq)]
pub struct PredictRequest {
    pub rank: u64,
    pub exam_type: String,
    pub seat_type: String,
    pub sub_category: String,
    pub home_state: Option<String>,
    pub mode: Mode,
    pub tag: Option<String>,
    pub fees_ceiling: Option<f64>,
    pub page: usize,
    pub page_size: usize,
}

impl PredictRequest {
    /// Key of the full ordered result list; page and page size are excluded
    pub fn cache_key(&self, max_length: usize) -> CacheResult<String> {
        KeyBuilder::new("predictor")
            .with_max_length(max_length)
            .param("exam", &self.exam_type)
            .param("rank", self.rank)
            .param("seat", &self.seat_type)
            .param("sub", &self.sub_category)
            .param("mode", self.mode)
            .param_opt("home", self.home_state.as_deref().map(str::to_ascii_lowercase))
            .param_opt("tag", self.tag.as_deref())
            .param_opt("fees", self.fees_ceiling)
            .build()
    }
}
