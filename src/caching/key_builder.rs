//! # Cache Key Builder
//!
//! Keys follow `namespace:qualifier:...` so that prefix patterns such as
//! `colleges:*` cover every variant of a read family. Filter maps are
//! canonicalised (sorted `k=v` pairs) so the same query always produces the
//! same key regardless of parameter order.

use super::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Separator between key components
pub const SEPARATOR: char = ':';

/// Builder for deterministic cache keys
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
    parts: Vec<String>,
    params: BTreeMap<String, String>,
    max_length: usize,
}

impl KeyBuilder {
    /// Start a key in the given namespace (`colleges`, `news:list`, ...)
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            parts: Vec::new(),
            params: BTreeMap::new(),
            max_length: 250,
        }
    }

    /// Keys longer than this get their params hashed
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Append a positional component
    pub fn part(mut self, part: impl Display) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Add a named parameter; order of calls does not matter
    pub fn param(mut self, name: &str, value: impl Display) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Add a named parameter only when present
    pub fn param_opt<V: Display>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// Add a list parameter; values are sorted and joined with `,`
    pub fn param_list<V: AsRef<str>>(self, name: &str, values: &[V]) -> Self {
        if values.is_empty() {
            return self;
        }
        let mut sorted: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();
        self.param(name, sorted.join(","))
    }

    /// Produce the key
    pub fn build(self) -> CacheResult<String> {
        if self.namespace.is_empty() {
            return Err(CacheError::KeyGeneration {
                message: "Cache key namespace cannot be empty".to_string(),
            });
        }

        let params: Vec<String> = self.params.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let mut prefix = self.namespace;
        for part in &self.parts {
            prefix.push(SEPARATOR);
            prefix.push_str(part);
        }

        if params.is_empty() {
            if prefix.len() > self.max_length {
                return Err(too_long(&prefix, self.max_length));
            }
            return Ok(prefix);
        }

        let joined = params.join(&SEPARATOR.to_string());
        let key = format!("{}{}{}", prefix, SEPARATOR, joined);
        if key.len() <= self.max_length {
            return Ok(key);
        }

        // Only params are hashed; namespace and parts must stay matchable by patterns
        let hashed = format!("{}{}h={}", prefix, SEPARATOR, hash_hex(&joined));
        if hashed.len() > self.max_length {
            return Err(too_long(&prefix, self.max_length));
        }
        Ok(hashed)
    }
}

fn too_long(prefix: &str, max_length: usize) -> CacheError {
    let shown: String = prefix.chars().take(64).collect();
    CacheError::KeyGeneration {
        message: format!("Key prefix '{}' leaves no room for a key within {} bytes", shown, max_length),
    }
}

fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::KeyPattern;

    #[test]
    fn test_namespace_only() {
        assert_eq!(KeyBuilder::new("dashboard:stats").build().unwrap(), "dashboard:stats");
    }

    #[test]
    fn test_params_are_order_independent() {
        let a = KeyBuilder::new("colleges")
            .param("state", "Delhi")
            .param("page", 2)
            .build()
            .unwrap();
        let b = KeyBuilder::new("colleges")
            .param("page", 2)
            .param("state", "Delhi")
            .build()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "colleges:page=2:state=Delhi");
    }

    #[test]
    fn test_parts_precede_params() {
        let key = KeyBuilder::new("topRecruiters")
            .part("iit-delhi")
            .param_opt("year", Some(2024))
            .param_opt::<u32>("limit", None)
            .build()
            .unwrap();
        assert_eq!(key, "topRecruiters:iit-delhi:year=2024");
    }

    #[test]
    fn test_list_params_are_sorted() {
        let key = KeyBuilder::new("colleges")
            .param_list("state", &["Tamil Nadu", "Delhi"])
            .param_list::<&str>("tag", &[])
            .build()
            .unwrap();
        assert_eq!(key, "colleges:state=Delhi,Tamil Nadu");
    }

    #[test]
    fn test_long_keys_are_hashed_under_namespace() {
        let search = "x".repeat(400);
        let key = KeyBuilder::new("colleges")
            .param("search", &search)
            .build()
            .unwrap();
        assert!(key.starts_with("colleges:h="));
        assert_eq!(key.len(), "colleges:h=".len() + 64);

        let again = KeyBuilder::new("colleges").param("search", &search).build().unwrap();
        assert_eq!(key, again);
    }

    #[test]
    fn test_empty_namespace_rejected() {
        assert!(KeyBuilder::new("").part("x").build().is_err());
    }

    #[test]
    fn test_namespace_too_long_for_hash() {
        let result = KeyBuilder::new("n".repeat(40))
            .with_max_length(50)
            .param("q", "y".repeat(100))
            .build();
        assert!(matches!(result, Err(CacheError::KeyGeneration { .. })));
    }

    #[test]
    fn test_long_params_keep_parts_readable() {
        let key = KeyBuilder::new("news")
            .part("list")
            .param("keyword", "k".repeat(240))
            .param("page", 1)
            .build()
            .unwrap();
        assert!(key.starts_with("news:list:h="));
        assert!(KeyPattern::new("news:list:*").matches(&key));
    }

    #[test]
    fn test_oversized_parts_are_rejected() {
        let result = KeyBuilder::new("college").part("slug").part("s".repeat(260)).build();
        assert!(matches!(result, Err(CacheError::KeyGeneration { .. })));

        let result = KeyBuilder::new("college")
            .with_max_length(30)
            .part("slug")
            .part("s".repeat(20))
            .param("page", 1)
            .build();
        assert!(matches!(result, Err(CacheError::KeyGeneration { .. })));
    }
}
