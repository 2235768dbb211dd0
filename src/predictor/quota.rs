//! Quota eligibility rules.

use super::EligibilityRow;
use std::collections::HashMap;

/// How a quota relates to the candidate's home state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRule {
    /// Usable by every candidate
    Open,
    /// Usable only when the row's state is the home state
    HomeState,
    /// Usable only when the row's state differs from the home state
    OtherState,
    /// Never usable
    Blocked,
}

/// Fixed allow/deny table keyed by quota code. Quotas absent from the table
/// are excluded.
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    rules: HashMap<String, QuotaRule>,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl QuotaPolicy {
    pub fn new() -> Self {
        Self { rules: HashMap::new() }
    }

    /// AI open; HS and GO home-state; OS other-state; JK and LA blocked
    pub fn standard() -> Self {
        Self::new()
            .rule("AI", QuotaRule::Open)
            .rule("HS", QuotaRule::HomeState)
            .rule("GO", QuotaRule::HomeState)
            .rule("OS", QuotaRule::OtherState)
            .rule("JK", QuotaRule::Blocked)
            .rule("LA", QuotaRule::Blocked)
    }

    pub fn rule(mut self, quota: &str, rule: QuotaRule) -> Self {
        self.rules.insert(quota.trim().to_ascii_uppercase(), rule);
        self
    }

    pub fn rule_for(&self, quota: &str) -> Option<QuotaRule> {
        self.rules.get(&quota.trim().to_ascii_uppercase()).copied()
    }

    /// Whether `row` is usable by a candidate from `home_state`. State-bound
    /// quotas need both the home state and the row's state.
    pub fn is_eligible(&self, row: &EligibilityRow, home_state: Option<&str>) -> bool {
        let same_state = match (row.state.as_deref(), home_state) {
            (Some(state), Some(home)) => Some(same_state(state, home)),
            _ => None,
        };

        match self.rule_for(&row.quota) {
            Some(QuotaRule::Open) => true,
            Some(QuotaRule::HomeState) => same_state == Some(true),
            Some(QuotaRule::OtherState) => same_state == Some(false),
            Some(QuotaRule::Blocked) | None => false,
        }
    }
}

/// `Tamil Nadu`, `tamil-nadu` and `TAMIL_NADU` are the same state
fn same_state(a: &str, b: &str) -> bool {
    fn norm(s: &str) -> String {
        s.trim()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c.to_ascii_lowercase() })
            .collect()
    }
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(quota: &str, state: Option<&str>) -> EligibilityRow {
        EligibilityRow {
            quota: quota.to_string(),
            state: state.map(str::to_string),
            ..EligibilityRow::sample("x", "Round-1", 2024, Some(100))
        }
    }

    #[test]
    fn test_all_india_always_eligible() {
        let policy = QuotaPolicy::standard();
        assert!(policy.is_eligible(&row("AI", None), None));
        assert!(policy.is_eligible(&row("ai", Some("Delhi")), Some("Goa")));
    }

    #[test]
    fn test_home_state_quota() {
        let policy = QuotaPolicy::standard();
        assert!(policy.is_eligible(&row("HS", Some("Tamil-Nadu")), Some("tamil nadu")));
        assert!(!policy.is_eligible(&row("HS", Some("Kerala")), Some("Tamil-Nadu")));
        assert!(!policy.is_eligible(&row("HS", Some("Kerala")), None));
        assert!(!policy.is_eligible(&row("GO", None), Some("Goa")));
    }

    #[test]
    fn test_other_state_quota() {
        let policy = QuotaPolicy::standard();
        assert!(policy.is_eligible(&row("OS", Some("Kerala")), Some("Tamil-Nadu")));
        assert!(!policy.is_eligible(&row("OS", Some("Kerala")), Some("Kerala")));
        assert!(!policy.is_eligible(&row("OS", Some("Kerala")), None));
    }

    #[test]
    fn test_blocked_and_unknown_quotas() {
        let policy = QuotaPolicy::standard();
        assert!(!policy.is_eligible(&row("JK", Some("Delhi")), Some("Delhi")));
        assert!(!policy.is_eligible(&row("LA", None), None));
        assert!(!policy.is_eligible(&row("XYZ", None), None));
        assert_eq!(policy.rule_for(" os "), Some(QuotaRule::OtherState));
    }
}
