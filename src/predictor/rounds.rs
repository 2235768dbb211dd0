//! Admission round sequences and representative-round selection.

use super::{EligibilityRow, Mode};
use std::cmp::Ordering;

/// Standard admission rounds, in counselling order
pub const SAFE_ROUNDS: [&str; 6] = ["Round-1", "Round-2", "Round-3", "Round-4", "Round-5", "Round-6"];

/// Standard rounds followed by supplementary counselling rounds
pub const RISK_ROUNDS: [&str; 10] = [
    "Round-1", "Round-2", "Round-3", "Round-4", "Round-5", "Round-6", "CSAB-1", "CSAB-2", "CSAB-3", "Special",
];

impl Mode {
    /// Ordered round labels this mode may match
    pub fn allowed_rounds(&self) -> &'static [&'static str] {
        match self {
            Mode::Safe => &SAFE_ROUNDS,
            Mode::Risk => &RISK_ROUNDS,
        }
    }

    /// Position of `round` in the mode's sequence
    pub fn position(&self, round: &str) -> Option<usize> {
        let round = round.trim();
        self.allowed_rounds().iter().position(|r| r.eq_ignore_ascii_case(round))
    }
}

/// Trailing number of a round label: `Round-3` -> 3, `CSAB-1` -> 1,
/// `Special` -> `None`
pub fn round_number(label: &str) -> Option<u32> {
    let label = label.trim();
    let digits_start = label
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    label[digits_start..].parse().ok()
}

/// Ordering used to pick a representative: position in the mode's sequence
/// (labels outside it last), then earliest year, then round number, then label
fn representative_order(mode: Mode, a: &EligibilityRow, b: &EligibilityRow) -> Ordering {
    let position = |r: &EligibilityRow| mode.position(&r.round).unwrap_or(usize::MAX);
    let number = |r: &EligibilityRow| round_number(&r.round).unwrap_or(u32::MAX);

    position(a)
        .cmp(&position(b))
        .then_with(|| a.year.cmp(&b.year))
        .then_with(|| number(a).cmp(&number(b)))
        .then_with(|| a.round.cmp(&b.round))
}

/// Representative row of a group, and whether it came from the risk-mode
/// fallback outside the allowed rounds.
///
/// A row is eligible when its closing threshold is at least `rank` and its
/// round is allowed by `mode`. Rows without a closing threshold never match.
pub fn select_representative(rows: &[EligibilityRow], rank: u64, mode: Mode) -> Option<(&EligibilityRow, bool)> {
    let reaches = |r: &&EligibilityRow| r.closing_rank.map_or(false, |threshold| threshold >= rank);

    let allowed = rows
        .iter()
        .filter(reaches)
        .filter(|r| mode.position(&r.round).is_some())
        .min_by(|a, b| representative_order(mode, a, b));

    match (allowed, mode) {
        (Some(row), _) => Some((row, false)),
        (None, Mode::Safe) => None,
        (None, Mode::Risk) => rows
            .iter()
            .filter(reaches)
            .min_by(|a, b| {
                a.year
                    .cmp(&b.year)
                    .then_with(|| representative_order(mode, a, b))
            })
            .map(|row| (row, true)),
    }
}
