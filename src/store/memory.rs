//! Process-local [`Store`] over JSON documents.

use super::{Document, Filter, FindOptions, GroupCount, Store, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// In-memory document store.
///
/// Documents keep insertion order, which is the stable order used by
/// [`Store::range_fetch`]. Inserts stamp `_id` (UUID v4), `createdAt` and
/// `updatedAt` unless the caller provided them.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    /// collection -> fields that must be unique
    unique: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject inserts and updates that would duplicate `field` in `collection`
    pub fn with_unique_index(self, collection: &str, field: &str) -> Self {
        self.unique
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map(Vec::len).unwrap_or(0)
    }

    fn now() -> Value {
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn prepare(doc: Document) -> StoreResult<Document> {
        let Value::Object(mut map) = doc else {
            return Err(StoreError::InvalidDocument {
                message: "document must be a JSON object".to_string(),
            });
        };
        map.entry("_id").or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        let now = Self::now();
        map.entry("createdAt").or_insert_with(|| now.clone());
        map.entry("updatedAt").or_insert(now);
        Ok(Value::Object(map))
    }

    /// Check unique fields of `candidate` against `existing`, ignoring the
    /// document with the same `_id`
    fn check_unique(&self, collection: &str, existing: &[Document], candidate: &Document) -> StoreResult<()> {
        let unique = self.unique.read();
        let Some(fields) = unique.get(collection) else {
            return Ok(());
        };
        let id = candidate.get("_id");
        for field in fields {
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            if existing
                .iter()
                .any(|doc| doc.get("_id") != id && doc.get(field) == Some(value))
            {
                return Err(StoreError::Conflict {
                    message: format!("duplicate {} '{}' in {}", field, value, collection),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Document> = docs.iter().filter(|doc| filter.matches(doc)).collect();
        if !options.sort.is_empty() {
            // Stable sort keeps insertion order among equal keys
            matched.sort_by(|a, b| options.compare(a, b));
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(options.skip)
            .take(limit)
            .map(|doc| options.apply_projection(doc.clone()))
            .collect())
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn aggregate_group(&self, collection: &str, filter: &Filter, field: &str) -> StoreResult<Vec<GroupCount>> {
        let collections = self.collections.read();
        let mut groups: Vec<GroupCount> = Vec::new();

        for doc in collections.get(collection).into_iter().flatten() {
            if !filter.matches(doc) {
                continue;
            }
            let key = super::filter::lookup(doc, field).cloned().unwrap_or(Value::Null);
            match groups.iter_mut().find(|g| g.key == key) {
                Some(group) => group.count += 1,
                None => groups.push(GroupCount { key, count: 1 }),
            }
        }

        groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| super::filter::compare_for_sort(Some(&a.key), Some(&b.key)))
        });
        Ok(groups)
    }

    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        let doc = Self::prepare(doc)?;
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        self.check_unique(collection, docs, &doc)?;
        docs.push(doc.clone());
        debug!("Inserted document into {}", collection);
        Ok(doc)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<Vec<Document>> {
        let prepared = docs.into_iter().map(Self::prepare).collect::<StoreResult<Vec<_>>>()?;

        let mut collections = self.collections.write();
        let existing = collections.entry(collection.to_string()).or_default();

        // Validate the whole batch before storing any of it
        let mut staged: Vec<Document> = existing.clone();
        for doc in &prepared {
            self.check_unique(collection, &staged, doc)?;
            staged.push(doc.clone());
        }
        *existing = staged;

        debug!("Inserted {} documents into {}", prepared.len(), collection);
        Ok(prepared)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, patch: Document) -> StoreResult<Option<Document>> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidDocument {
                message: "update patch must be a JSON object".to_string(),
            });
        };

        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = docs.iter().position(|doc| filter.matches(doc)) else {
            return Ok(None);
        };

        let mut updated: Map<String, Value> = match &docs[index] {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for (field, value) in patch {
            // `_id` is immutable
            if field != "_id" {
                updated.insert(field, value);
            }
        }
        updated.insert("updatedAt".to_string(), Self::now());
        let updated = Value::Object(updated);

        self.check_unique(collection, docs, &updated)?;
        docs[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|doc| filter.matches(doc))
            .map(|index| docs.remove(index)))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));
        Ok((before - docs.len()) as u64)
    }
}
