//! Vector Record Store — persists `(id, vector, payload)` triples and answers top-k queries.
//!
//! Two interchangeable backends sit behind `VectorStore`:
//! - `RemoteVectorStore`: a Qdrant-compatible vector database over REST.
//! - `InProcessVectorStore`: a linear scan over vectors kept beside the primary records.
//!
//! Both order their hits through `ranking::rank_results`, so the tie-break rules are
//! shared rather than re-implemented per backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::matching::errors::StoreError;

pub mod in_process;
pub mod remote;
pub mod rows;

pub use in_process::InProcessVectorStore;
pub use remote::RemoteVectorStore;
pub use rows::{MemoryVectorRows, PgVectorRows, VectorRows};

/// Distance metric of a collection. Only cosine is used by the matching core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
        }
    }
}

/// A named set of records sharing a dimension and a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
}

impl CollectionSpec {
    pub fn cosine(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            distance: Distance::Cosine,
        }
    }
}

/// A stored vector. Re-upserting the same `id` replaces vector and payload wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One search hit. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub id: String,
    pub score: f32,
    /// Creation time of the source record, used as the first tie-break.
    pub created_at: Option<DateTime<Utc>>,
    pub payload: Value,
}

/// Reads the `created_at` timestamp a payload carries, if any.
pub fn payload_created_at(payload: &Value) -> Option<DateTime<Utc>> {
    payload
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Storage contract shared by every backend.
///
/// `upsert` and `search` call `ensure_collection` first, so a collection dropped
/// behind the service's back is recreated on next use.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend label for logs ("qdrant", "postgres", "memory").
    fn backend(&self) -> &'static str;

    /// Creates the collection if absent. Fails if it exists with another dimension.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError>;

    /// Inserts or fully replaces the record at `record.id`.
    async fn upsert(&self, spec: &CollectionSpec, record: VectorRecord) -> Result<(), StoreError>;

    /// Returns up to `k` hits ordered by descending similarity, ties broken by
    /// `ranking::rank_results`.
    async fn search(
        &self,
        spec: &CollectionSpec,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredResult>, StoreError>;

    /// Removes the record at `id`. Missing records are not an error.
    async fn delete(&self, spec: &CollectionSpec, id: &str) -> Result<(), StoreError>;
}
