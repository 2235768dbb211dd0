//! Document filters, sort options and value ordering.
//!
//! A fixed set of predicates over JSON documents, enough for every catalog
//! and predictor query. Field names may be dotted paths (`location.state`).
//! As in document databases, an equality test against an array field matches
//! when any element is equal.

use serde_json::Value;
use std::cmp::Ordering;

/// Predicate over a JSON document
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every document
    All,
    Eq(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
    /// Case-insensitive match of a literal term anywhere in a string field;
    /// the term is stored lowercased
    Contains(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn in_values<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::Gte(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::Lte(field.to_string(), value.into())
    }

    /// Substring search; the term is matched literally, ignoring case
    pub fn contains(field: &str, term: &str) -> Self {
        Self::Contains(field.to_string(), term.to_lowercase())
    }

    /// Conjunction; an empty list matches everything
    pub fn and(filters: Vec<Filter>) -> Self {
        let mut filters: Vec<Filter> = filters.into_iter().filter(|f| !matches!(f, Filter::All)).collect();
        match filters.len() {
            0 => Self::All,
            1 => filters.remove(0),
            _ => Self::And(filters),
        }
    }

    /// Disjunction; an empty list matches nothing
    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Evaluate the filter against a document
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, expected) => any_value(lookup(doc, field), |v| values_equal(v, expected)),
            Self::In(field, candidates) => any_value(lookup(doc, field), |v| {
                candidates.iter().any(|c| values_equal(v, c))
            }),
            Self::Gte(field, bound) => any_value(lookup(doc, field), |v| {
                matches!(compare_scalars(v, bound), Some(Ordering::Greater | Ordering::Equal))
            }),
            Self::Lte(field, bound) => any_value(lookup(doc, field), |v| {
                matches!(compare_scalars(v, bound), Some(Ordering::Less | Ordering::Equal))
            }),
            Self::Contains(field, term) => any_value(lookup(doc, field), |v| {
                v.as_str().map(|s| s.to_lowercase().contains(term.as_str())).unwrap_or(false)
            }),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
        }
    }
}

/// Resolve a dotted path
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

/// Apply `test` to a scalar, or to each element of an array
fn any_value(value: Option<&Value>, test: impl Fn(&Value) -> bool) -> bool {
    match value {
        Some(Value::Array(items)) => items.iter().any(&test),
        Some(v) => test(v),
        None => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering of two scalars of the same kind; `None` across kinds
pub fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order for sorting: missing and null first, then booleans, numbers,
/// strings, and anything else by its JSON text
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) if rank(a) == rank(b) => {
            compare_scalars(x, y).unwrap_or_else(|| x.to_string().cmp(&y.to_string()))
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options for [`Store::find`](super::Store::find)
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort keys, most significant first
    pub sort: Vec<(String, SortOrder)>,
    pub skip: usize,
    pub limit: Option<usize>,
    /// Top-level fields to keep (plus `_id`); `None` keeps everything
    pub projection: Option<Vec<String>>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push((field.to_string(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn project(mut self, fields: &[&str]) -> Self {
        self.projection = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Compare two documents by the sort keys
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, order) in &self.sort {
            let ord = compare_for_sort(lookup(a, field), lookup(b, field));
            let ord = match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Apply the projection to a document
    pub fn apply_projection(&self, doc: Value) -> Value {
        let Some(fields) = &self.projection else {
            return doc;
        };
        match doc {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| k == "_id" || fields.iter().any(|f| f == k))
                    .collect(),
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn college() -> Value {
        json!({
            "_id": "1",
            "slug": "iit-delhi",
            "name": "Indian Institute of Technology Delhi",
            "location": {"state": "Delhi"},
            "tags": ["iit", "engineering"],
            "fees": 220000,
            "placementRate": 92.5
        })
    }

    #[test]
    fn test_eq_and_dotted_paths() {
        let doc = college();
        assert!(Filter::eq("slug", "iit-delhi").matches(&doc));
        assert!(Filter::eq("location.state", "Delhi").matches(&doc));
        assert!(!Filter::eq("location.city", "Delhi").matches(&doc));
        assert!(Filter::eq("fees", 220000.0).matches(&doc));
    }

    #[test]
    fn test_array_fields_match_any_element() {
        let doc = college();
        assert!(Filter::eq("tags", "iit").matches(&doc));
        assert!(Filter::in_values("tags", ["nit", "engineering"]).matches(&doc));
        assert!(!Filter::in_values("tags", ["medical"]).matches(&doc));
    }

    #[test]
    fn test_range_filters() {
        let doc = college();
        assert!(Filter::gte("placementRate", 90).matches(&doc));
        assert!(!Filter::lte("fees", 100000).matches(&doc));
        // Mismatched kinds never satisfy a range
        assert!(!Filter::gte("slug", 1).matches(&doc));
    }

    #[test]
    fn test_contains_is_literal_and_case_insensitive() {
        let doc = college();
        assert!(Filter::contains("name", "technology DELHI").matches(&doc));
        assert!(!Filter::contains("name", "tech.*delhi").matches(&doc));
    }

    #[test]
    fn test_combinators() {
        let doc = college();
        assert!(Filter::and(vec![]).matches(&doc));
        assert!(!Filter::or(vec![]).matches(&doc));
        assert!(Filter::and(vec![Filter::All, Filter::eq("slug", "iit-delhi")]).matches(&doc));
        assert!(Filter::not(Filter::eq("slug", "nit-trichy")).matches(&doc));
        assert!(Filter::or(vec![Filter::eq("slug", "x"), Filter::eq("fees", 220000)]).matches(&doc));
    }

    #[test]
    fn test_sort_order_and_projection() {
        let a = json!({"_id": "a", "year": 2023, "name": "A"});
        let b = json!({"_id": "b", "year": 2024, "name": "B"});
        let c = json!({"_id": "c", "name": "C"});

        let options = FindOptions::new().sort_by("year", SortOrder::Descending);
        let mut docs = vec![a.clone(), c.clone(), b.clone()];
        docs.sort_by(|x, y| options.compare(x, y));
        assert_eq!(docs, vec![b, a.clone(), c]);

        let projected = FindOptions::new().project(&["year"]).apply_projection(a);
        assert_eq!(projected, json!({"_id": "a", "year": 2023}));
    }
}
