//! # Predictor Property Tests
//!
//! Pipeline properties checked over generated inputs, plus an end-to-end run
//! through the wired services showing cutoff writes refresh predictions.

use campus_cache::caching::stores::InMemoryCacheConfig;
use campus_cache::caching::{CacheConfig, CacheManager, CacheStore, InMemoryCache};
use campus_cache::catalog::{CutoffBatch, CutoffItem};
use campus_cache::predictor::pipeline::{final_score, group_rows, paginate, rank_score, select_groups};
use campus_cache::predictor::{EligibilityRow, PredictionResult, RepresentativeRound};
use campus_cache::store::MemoryStore;
use campus_cache::{CampusServices, Mode, PredictParams, ServiceConfig};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

const ROUNDS: [&str; 5] = ["Round-1", "Round-2", "Round-6", "CSAB-1", "Special"];

fn row(slug: &str, round: &str, year: i32, closing: Option<u64>) -> EligibilityRow {
    EligibilityRow {
        slug: slug.to_string(),
        course: "B.Tech".to_string(),
        branch: "Computer Science".to_string(),
        round: round.to_string(),
        year,
        seat_type: "OPEN".to_string(),
        sub_category: "Gender-Neutral".to_string(),
        quota: "AI".to_string(),
        state: None,
        opening_rank: None,
        closing_rank: closing,
        branch_weight: None,
    }
}

fn arb_rows() -> impl Strategy<Value = Vec<EligibilityRow>> {
    prop::collection::vec(
        (0usize..6, 0usize..ROUNDS.len(), 2021i32..=2024, prop::option::weighted(0.9, 1u64..20_000)),
        0..40,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .map(|(college, round, year, closing)| row(&format!("c{}", college), ROUNDS[round], year, closing))
            .collect()
    })
}

fn selected_slugs(rows: &[EligibilityRow], rank: u64, mode: Mode) -> BTreeSet<String> {
    select_groups(group_rows(rows.to_vec()), rank, mode)
        .into_iter()
        .map(|s| s.group.slug)
        .collect()
}

fn result(index: usize) -> PredictionResult {
    PredictionResult {
        slug: format!("c{}", index),
        course: "B.Tech".to_string(),
        branch: "Computer Science".to_string(),
        tag: format!("c{}", index),
        college_name: None,
        location: None,
        state: None,
        nirf_rank: None,
        fees: None,
        institute_type: None,
        representative: RepresentativeRound {
            round: "Round-1".to_string(),
            year: 2024,
            closing_rank: 1000,
            quota: "AI".to_string(),
        },
        cutoffs: Vec::new(),
        rank_score: 0.5,
        final_score: 0.5,
        fallback: false,
    }
}

proptest! {
    /// A worse rank never unlocks a group in safe mode
    #[test]
    fn prop_safe_mode_is_monotonic(rows in arb_rows(), better in 1u64..20_000, gap in 0u64..10_000) {
        let worse = better + gap;
        let at_worse = selected_slugs(&rows, worse, Mode::Safe);
        let at_better = selected_slugs(&rows, better, Mode::Safe);
        prop_assert!(at_worse.is_subset(&at_better));
    }

    /// Risk mode keeps every group safe mode keeps
    #[test]
    fn prop_risk_mode_extends_safe_mode(rows in arb_rows(), rank in 1u64..20_000) {
        let safe = selected_slugs(&rows, rank, Mode::Safe);
        let risk = selected_slugs(&rows, rank, Mode::Risk);
        prop_assert!(safe.is_subset(&risk));
    }

    /// A standard round that reaches the rank always beats a supplementary one
    #[test]
    fn prop_standard_round_preferred_in_risk_mode(rows in arb_rows(), rank in 1u64..20_000) {
        for selected in select_groups(group_rows(rows.clone()), rank, Mode::Risk) {
            let standard_reaches = selected.group.rows.iter().any(|r| {
                Mode::Safe.position(&r.round).is_some() && r.closing_rank.map_or(false, |c| c >= rank)
            });
            if standard_reaches {
                prop_assert!(Mode::Safe.position(&selected.representative.round).is_some());
            }
        }
    }

    /// Walking every page reproduces the full list in order
    #[test]
    fn prop_pages_concatenate_to_full_list(len in 0usize..60, page_size in 1usize..15) {
        let all: Vec<PredictionResult> = (0..len).map(result).collect();
        let pages = (len + page_size - 1) / page_size;

        let mut walked = Vec::new();
        for page in 1..=pages {
            let chunk = paginate(&all, page, page_size);
            prop_assert_eq!(chunk.total_results, len);
            prop_assert!(chunk.results.len() <= page_size);
            walked.extend(chunk.results);
        }
        prop_assert_eq!(walked, all.clone());
        prop_assert!(paginate(&all, pages + 1, page_size).results.is_empty());
    }

    /// Scores stay within their unit ranges for any weights
    #[test]
    fn prop_scores_are_bounded(
        rank in 1u64..100_000,
        threshold in 0u64..100_000,
        branch in -500.0f64..500.0,
        college in -500.0f64..500.0,
    ) {
        let rank_part = rank_score(rank, threshold);
        prop_assert!((0.0..=1.0).contains(&rank_part));
        let total = final_score(rank_part, branch, college);
        prop_assert!((0.0..=1.0).contains(&total));
    }
}

#[test]
fn test_exact_threshold_scores_full_rank_part() {
    assert_eq!(rank_score(550, 550), 1.0);
    assert_eq!(rank_score(550, 0), 0.0);
    assert_eq!(rank_score(2_000, 500), 0.0);
}

#[test]
fn test_risk_mode_picks_round_two_over_csab() {
    let rows = vec![row("c1", "CSAB-1", 2024, Some(700)), row("c1", "Round-2", 2024, Some(600))];
    let selected = select_groups(group_rows(rows), 550, Mode::Risk);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].representative.round, "Round-2");
    assert!(!selected[0].fallback);
}

fn cutoffs(slug: &str, closing: u64) -> CutoffBatch {
    CutoffBatch {
        exam_type: "JEE-Main".to_string(),
        year: 2024,
        slug: slug.to_string(),
        seat_type: "GEN".to_string(),
        sub_category: "Gender-Neutral".to_string(),
        cutoffs: vec![CutoffItem {
            course: "B.Tech".to_string(),
            branch: "Computer Science".to_string(),
            round: "Round-1".to_string(),
            quota: "AI".to_string(),
            state: None,
            opening_rank: Some(1),
            closing_rank: Some(closing),
            branch_weight: Some(80.0),
        }],
    }
}

#[tokio::test]
async fn test_cutoff_upload_refreshes_cached_predictions() {
    let local: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());
    let cache = Arc::new(CacheManager::with_tiers(CacheConfig::default(), Some(local), None));
    let services = CampusServices::with_cache(ServiceConfig::default(), Arc::new(MemoryStore::new()), cache);

    services.cutoffs.create_bulk(cutoffs("nit-trichy", 4_000)).await.unwrap();

    let params = PredictParams {
        rank: Some(3_000),
        exam_type: Some("JEE-Main".to_string()),
        seat_type: Some("OPEN".to_string()),
        sub_category: Some("Gender-Neutral".to_string()),
        ..Default::default()
    };
    let before = services.predictor.predict(&params).await.unwrap();
    assert_eq!(before.total_results, 1);
    assert_eq!(before.results[0].tag, "nit");

    services.cutoffs.create_bulk(cutoffs("iiit-delhi", 3_500)).await.unwrap();

    let after = services.predictor.predict(&params).await.unwrap();
    assert_eq!(after.total_results, 2);
    // Closer threshold ranks first
    assert_eq!(after.results[0].slug, "iiit-delhi");
}
