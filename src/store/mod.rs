//! # Store Module
//!
//! The authoritative dataset behind the caches: JSON documents grouped in
//! named collections. [`Store`] is the query surface the catalog services and
//! the predictor are written against; [`MemoryStore`] is the process-local
//! implementation used by tests and embedded deployments.

pub mod filter;
pub mod memory;

pub use filter::{Filter, FindOptions, SortOrder};
pub use memory::MemoryStore;

/// Collection names
pub mod collections {
    pub const COLLEGES: &str = "colleges";
    pub const CUTOFFS: &str = "cutoffs";
    pub const NEWS: &str = "news";
    pub const PLACEMENTS: &str = "placements";
    pub const PLACEMENT_STATS: &str = "placementStats";
    pub const TOP_RECRUITERS: &str = "topRecruiters";
}

use crate::core::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored document; always a JSON object carrying an `_id`
pub type Document = Value;

/// Store operation result
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {message}")]
    Backend { message: String },

    #[error("Store operation '{operation}' timed out")]
    Timeout { operation: String },

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::store(err.to_string())
    }
}

/// Count of documents sharing one value of a grouped field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    /// The field value; `null` for documents lacking the field
    pub key: Value,
    pub count: u64,
}

/// Query surface of the authoritative store
#[async_trait]
pub trait Store: Send + Sync {
    /// Matching documents, sorted, windowed and projected per `options`
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>>;

    /// First matching document
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut docs = self.find(collection, filter, &FindOptions::new().limit(1)).await?;
        Ok(docs.pop())
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Group matching documents by `field`, most frequent first
    async fn aggregate_group(&self, collection: &str, filter: &Filter, field: &str) -> StoreResult<Vec<GroupCount>>;

    /// One page of matching documents in a stable order. A page shorter than
    /// `limit` means the end of the data.
    async fn range_fetch(
        &self,
        collection: &str,
        filter: &Filter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        self.find(collection, filter, &FindOptions::new().skip(offset).limit(limit)).await
    }

    /// Insert one document, returning it with its assigned `_id`
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document>;

    /// Insert several documents; all or none are stored
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<Vec<Document>>;

    /// Merge `patch` into the first matching document, returning the result
    async fn update_one(&self, collection: &str, filter: &Filter, patch: Document) -> StoreResult<Option<Document>>;

    /// Remove the first matching document, returning it
    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Remove every matching document, returning how many were removed
    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
}
