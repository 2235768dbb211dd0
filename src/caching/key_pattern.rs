//! # Key Patterns
//!
//! A [`KeyPattern`] names a family of cache keys, e.g. `colleges:*` or
//! `college:slug:{key}`. `*` matches any run of characters (including `:`),
//! `{key}` is a placeholder for an entity key that is filled in with
//! [`KeyPattern::resolve`]. The same pattern drives matching in the local tier
//! (enumerate and test) and the shared tier (`SCAN MATCH` glob).

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const PLACEHOLDER: &str = "{key}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
    Placeholder,
}

/// Template identifying a family of cache keys
#[derive(Debug, Clone)]
pub struct KeyPattern {
    segments: Vec<Segment>,
    matcher: Regex,
}

impl KeyPattern {
    /// Parse a template such as `topRecruiters:{key}:*`
    pub fn new(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix(PLACEHOLDER) {
                flush_literal(&mut literal, &mut segments);
                segments.push(Segment::Placeholder);
                rest = after;
            } else if let Some(after) = rest.strip_prefix('*') {
                flush_literal(&mut literal, &mut segments);
                // Consecutive wildcards collapse into one
                if segments.last() != Some(&Segment::Wildcard) {
                    segments.push(Segment::Wildcard);
                }
                rest = after;
            } else {
                let mut chars = rest.chars();
                if let Some(c) = chars.next() {
                    literal.push(c);
                }
                rest = chars.as_str();
            }
        }
        flush_literal(&mut literal, &mut segments);

        Self::from_segments(segments)
    }

    /// Pattern matching exactly one key
    pub fn exact(key: &str) -> Self {
        Self::from_segments(vec![Segment::Literal(key.to_string())])
    }

    /// Pattern matching every key starting with `prefix`
    pub fn prefix(prefix: &str) -> Self {
        Self::from_segments(vec![Segment::Literal(prefix.to_string()), Segment::Wildcard])
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let mut source = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => source.push_str(&regex::escape(text)),
                // An unresolved placeholder behaves like a wildcard when matching
                Segment::Wildcard | Segment::Placeholder => source.push_str(".*"),
            }
        }
        source.push('$');

        let matcher = Regex::new(&source).expect("escaped literals and .* always form a valid regex");
        Self { segments, matcher }
    }

    /// Fill the `{key}` placeholder with a literal entity key, or with `*` when
    /// the key is unknown so that every instance is covered
    pub fn resolve(&self, key: Option<&str>) -> Self {
        let mut segments: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let next = match (segment, key) {
                (Segment::Placeholder, Some(k)) => Segment::Literal(k.to_string()),
                (Segment::Placeholder, None) => Segment::Wildcard,
                (other, _) => other.clone(),
            };
            match (segments.last_mut(), next) {
                (Some(Segment::Literal(prev)), Segment::Literal(text)) => prev.push_str(&text),
                (Some(Segment::Wildcard), Segment::Wildcard) => {}
                (_, next) => segments.push(next),
            }
        }
        Self::from_segments(segments)
    }

    /// Whether the template contains a `{key}` placeholder
    pub fn is_keyed(&self) -> bool {
        self.segments.contains(&Segment::Placeholder)
    }

    /// Whether the pattern names a single literal key
    pub fn is_exact(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// The literal key for an exact pattern
    pub fn as_exact_key(&self) -> Option<String> {
        if !self.is_exact() {
            return None;
        }
        Some(
            self.segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Literal(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Test a concrete key against the pattern
    pub fn matches(&self, key: &str) -> bool {
        self.matcher.is_match(key)
    }

    /// Filter a key listing down to the matching keys
    pub fn scan<'a, I>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter().filter(|k| self.matches(k)).cloned().collect()
    }

    /// Redis `SCAN MATCH` glob for this pattern, with glob metacharacters in
    /// literal segments escaped
    pub fn as_redis_glob(&self) -> String {
        let mut glob = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    for c in text.chars() {
                        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                            glob.push('\\');
                        }
                        glob.push(c);
                    }
                }
                Segment::Wildcard | Segment::Placeholder => glob.push('*'),
            }
        }
        glob
    }
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => f.write_str(text)?,
                Segment::Wildcard => f.write_str("*")?,
                Segment::Placeholder => f.write_str(PLACEHOLDER)?,
            }
        }
        Ok(())
    }
}

impl PartialEq for KeyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for KeyPattern {}

impl Serialize for KeyPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let template = String::deserialize(deserializer)?;
        Ok(Self::new(&template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matching() {
        let pattern = KeyPattern::new("colleges:*");
        assert!(pattern.matches("colleges:state=Delhi:page=1"));
        assert!(pattern.matches("colleges:"));
        assert!(!pattern.matches("college:slug:iit-delhi"));
        assert!(!pattern.matches("xcolleges:1"));
    }

    #[test]
    fn test_inner_wildcard() {
        let pattern = KeyPattern::new("topRecruiters:*:2024");
        assert!(pattern.matches("topRecruiters:iit-delhi:2024"));
        assert!(!pattern.matches("topRecruiters:iit-delhi:2023"));
    }

    #[test]
    fn test_literal_metacharacters_are_not_regex() {
        let pattern = KeyPattern::new("cutoffs:{\"slug\":\"a.b\"}");
        assert!(pattern.is_exact());
        assert!(pattern.matches("cutoffs:{\"slug\":\"a.b\"}"));
        assert!(!pattern.matches("cutoffs:{\"slug\":\"aXb\"}"));
    }

    #[test]
    fn test_resolve_with_key() {
        let template = KeyPattern::new("college:slug:{key}");
        assert!(template.is_keyed());

        let resolved = template.resolve(Some("iit-bombay"));
        assert!(resolved.is_exact());
        assert_eq!(resolved.as_exact_key().as_deref(), Some("college:slug:iit-bombay"));
        assert!(resolved.matches("college:slug:iit-bombay"));
        assert!(!resolved.matches("college:slug:iit-delhi"));
    }

    #[test]
    fn test_resolve_without_key_widens_to_wildcard() {
        let resolved = KeyPattern::new("topRecruiters:{key}:*").resolve(None);
        assert_eq!(resolved.to_string(), "topRecruiters:*:*");
        assert!(resolved.matches("topRecruiters:nit-trichy:2023"));
    }

    #[test]
    fn test_resolved_key_is_literal() {
        let resolved = KeyPattern::new("news:slug:{key}").resolve(Some("a*b"));
        assert!(resolved.matches("news:slug:a*b"));
        assert!(!resolved.matches("news:slug:aXXb"));
        assert_eq!(resolved.as_redis_glob(), "news:slug:a\\*b");
    }

    #[test]
    fn test_redis_glob() {
        assert_eq!(KeyPattern::new("dashboard:*").as_redis_glob(), "dashboard:*");
        assert_eq!(KeyPattern::new("college:slug:{key}").as_redis_glob(), "college:slug:*");
        assert_eq!(KeyPattern::exact("cutoffs:[x]").as_redis_glob(), "cutoffs:\\[x\\]");
    }

    #[test]
    fn test_scan() {
        let keys = vec![
            "dashboard:stats".to_string(),
            "dashboard:college-types".to_string(),
            "news:list:page=1".to_string(),
        ];
        let mut matched = KeyPattern::prefix("dashboard:").scan(&keys);
        matched.sort();
        assert_eq!(matched, vec!["dashboard:college-types", "dashboard:stats"]);
    }

    #[test]
    fn test_display_round_trips_template() {
        let template = "topRecruiters:{key}:*";
        assert_eq!(KeyPattern::new(template).to_string(), template);
        assert_eq!(KeyPattern::new("a**b"), KeyPattern::new("a*b"));
    }
}
