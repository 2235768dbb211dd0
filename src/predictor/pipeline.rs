//! Pure prediction stages: each takes an owned collection and returns a new
//! one, so the tie-break and scoring rules can be tested in isolation.
//!
//! filter quota -> group -> select representative -> score -> sort ->
//! post-filter -> paginate

use super::quota::QuotaPolicy;
use super::rounds::{round_number, select_representative};
use super::{
    CollegeProfile, EligibilityRow, Mode, PredictionPage, PredictionResult, RepresentativeRound, RoundCutoff,
    YearCutoffs,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

const RANK_WEIGHT: f64 = 0.4;
const BRANCH_WEIGHT: f64 = 0.3;
const COLLEGE_WEIGHT: f64 = 0.3;

/// Rows sharing `(slug, course, branch)`
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionGroup {
    pub slug: String,
    pub course: String,
    pub branch: String,
    pub rows: Vec<EligibilityRow>,
}

/// A group with its chosen representative
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedGroup {
    pub group: PredictionGroup,
    pub representative: EligibilityRow,
    pub fallback: bool,
}

pub fn filter_quota(rows: Vec<EligibilityRow>, policy: &QuotaPolicy, home_state: Option<&str>) -> Vec<EligibilityRow> {
    rows.into_iter().filter(|row| policy.is_eligible(row, home_state)).collect()
}

/// Group rows; groups come out ordered by key
pub fn group_rows(rows: Vec<EligibilityRow>) -> Vec<PredictionGroup> {
    let mut groups: BTreeMap<(String, String, String), Vec<EligibilityRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.slug.clone(), row.course.clone(), row.branch.clone()))
            .or_default()
            .push(row);
    }
    groups
        .into_iter()
        .map(|((slug, course, branch), rows)| PredictionGroup {
            slug,
            course,
            branch,
            rows,
        })
        .collect()
}

/// Keep groups with a representative round for `rank` under `mode`
pub fn select_groups(groups: Vec<PredictionGroup>, rank: u64, mode: Mode) -> Vec<SelectedGroup> {
    groups
        .into_iter()
        .filter_map(|group| {
            let (representative, fallback) = select_representative(&group.rows, rank, mode)
                .map(|(row, fallback)| (row.clone(), fallback))?;
            Some(SelectedGroup {
                group,
                representative,
                fallback,
            })
        })
        .collect()
}

/// `max(0, 1 - |rank - threshold| / threshold)`, 0 for a zero threshold
pub fn rank_score(rank: u64, threshold: u64) -> f64 {
    if threshold == 0 {
        return 0.0;
    }
    let distance = (rank as f64 - threshold as f64).abs();
    (1.0 - distance / threshold as f64).max(0.0)
}

/// Weighted composite; weights are clamped to `[0, 100]`
pub fn final_score(rank_score: f64, branch_weight: f64, college_weight: f64) -> f64 {
    let branch = branch_weight.clamp(0.0, 100.0) / 100.0;
    let college = college_weight.clamp(0.0, 100.0) / 100.0;
    rank_score * RANK_WEIGHT + branch * BRANCH_WEIGHT + college * COLLEGE_WEIGHT
}

/// Per-year cutoffs of every row in the group; years newest first, rounds in
/// counselling order. Rows without a closing threshold are left out.
pub fn cutoff_map(rows: &[EligibilityRow]) -> Vec<YearCutoffs> {
    let mut years: BTreeMap<i32, Vec<RoundCutoff>> = BTreeMap::new();
    for row in rows {
        let Some(closing_rank) = row.closing_rank else {
            continue;
        };
        let rounds = years.entry(row.year).or_default();
        // One cell per round and year; the tightest threshold wins
        match rounds.iter_mut().find(|c| c.round == row.round) {
            Some(cell) if closing_rank < cell.closing_rank => {
                cell.closing_rank = closing_rank;
                cell.opening_rank = row.opening_rank;
            }
            Some(_) => {}
            None => rounds.push(RoundCutoff {
                round: row.round.clone(),
                opening_rank: row.opening_rank,
                closing_rank,
            }),
        }
    }

    years
        .into_iter()
        .rev()
        .map(|(year, mut rounds)| {
            rounds.sort_by(|a, b| {
                Mode::Risk
                    .position(&a.round)
                    .unwrap_or(usize::MAX)
                    .cmp(&Mode::Risk.position(&b.round).unwrap_or(usize::MAX))
                    .then_with(|| {
                        round_number(&a.round)
                            .unwrap_or(u32::MAX)
                            .cmp(&round_number(&b.round).unwrap_or(u32::MAX))
                    })
                    .then_with(|| a.round.cmp(&b.round))
            });
            YearCutoffs { year, rounds }
        })
        .collect()
}

/// Score each selected group and attach its profile
pub fn score_groups(
    selected: Vec<SelectedGroup>,
    rank: u64,
    profiles: &HashMap<String, CollegeProfile>,
    default_weight: f64,
) -> Vec<PredictionResult> {
    selected
        .into_iter()
        .map(|SelectedGroup { group, representative, fallback }| {
            let profile = profiles.get(&group.slug);
            let threshold = representative.closing_rank.unwrap_or(0);

            let branch_weight = representative
                .branch_weight
                .or_else(|| group.rows.iter().find_map(|r| r.branch_weight))
                .unwrap_or(default_weight);
            let college_weight = profile.and_then(|p| p.college_weight).unwrap_or(default_weight);

            let rank_score = rank_score(rank, threshold);
            let final_score = final_score(rank_score, branch_weight, college_weight);

            PredictionResult {
                tag: slug_tag(&group.slug),
                college_name: profile.and_then(|p| p.name.clone()),
                location: profile.and_then(|p| p.location.clone()),
                state: profile.and_then(|p| p.state.clone()),
                nirf_rank: profile.and_then(|p| p.nirf.clone()),
                fees: profile.and_then(|p| p.fees),
                institute_type: profile.and_then(|p| p.institute_type.clone()),
                cutoffs: cutoff_map(&group.rows),
                representative: RepresentativeRound {
                    round: representative.round,
                    year: representative.year,
                    closing_rank: threshold,
                    quota: representative.quota,
                },
                fallback,
                rank_score,
                final_score,
                slug: group.slug,
                course: group.course,
                branch: group.branch,
            }
        })
        .collect()
}

/// Highest score first; equal scores by slug, course, branch
pub fn sort_results(mut results: Vec<PredictionResult>) -> Vec<PredictionResult> {
    results.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.slug.cmp(&b.slug))
            .then_with(|| a.course.cmp(&b.course))
            .then_with(|| a.branch.cmp(&b.branch))
    });
    results
}

/// Category derived from a slug: the part before the first `-`
pub fn slug_tag(slug: &str) -> String {
    slug.split('-').next().unwrap_or(slug).to_ascii_lowercase()
}

/// Drop results outside the tag or above the fee ceiling. With a ceiling set,
/// results without a known fee are dropped too.
pub fn post_filter(results: Vec<PredictionResult>, tag: Option<&str>, fees_ceiling: Option<f64>) -> Vec<PredictionResult> {
    results
        .into_iter()
        .filter(|r| tag.map_or(true, |t| r.tag.eq_ignore_ascii_case(t)))
        .filter(|r| match fees_ceiling {
            Some(ceiling) => r.fees.map_or(false, |fees| fees <= ceiling),
            None => true,
        })
        .collect()
}

/// 1-indexed page; a page past the end is empty
pub fn paginate(results: &[PredictionResult], page: usize, page_size: usize) -> PredictionPage {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let slice = results.iter().skip(start).take(page_size).cloned().collect();
    PredictionPage {
        total_results: results.len(),
        page,
        page_size,
        results: slice,
    }
}
