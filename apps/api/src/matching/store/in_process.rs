use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::matching::errors::StoreError;
use crate::matching::ranking::top_k;
use crate::matching::similarity::cosine_similarity;
use crate::matching::store::rows::VectorRows;
use crate::matching::store::{
    payload_created_at, CollectionSpec, ScoredResult, VectorRecord, VectorStore,
};

/// Linear-scan backend: scores every stored vector against the query.
pub struct InProcessVectorStore {
    rows: Arc<dyn VectorRows>,
    timeout: Duration,
}

impl InProcessVectorStore {
    pub fn new(rows: Arc<dyn VectorRows>, timeout: Duration) -> Self {
        Self { rows, timeout }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl VectorStore for InProcessVectorStore {
    fn backend(&self) -> &'static str {
        self.rows.label()
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        self.bounded(self.rows.ensure_collection(spec)).await
    }

    async fn upsert(&self, spec: &CollectionSpec, record: VectorRecord) -> Result<(), StoreError> {
        if record.vector.len() != spec.dimension {
            return Err(StoreError::InvalidVector {
                expected: spec.dimension,
                actual: record.vector.len(),
            });
        }
        self.ensure_collection(spec).await?;
        self.bounded(self.rows.write(&spec.name, &record)).await
    }

    async fn search(
        &self,
        spec: &CollectionSpec,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredResult>, StoreError> {
        self.ensure_collection(spec).await?;
        let rows = self.bounded(self.rows.scan(&spec.name)).await?;
        let scanned = rows.len();

        let hits: Vec<ScoredResult> = rows
            .into_iter()
            .filter_map(|row| {
                let vector = row.vector.filter(|v| !v.is_empty())?;
                Some(ScoredResult {
                    score: cosine_similarity(query, &vector),
                    created_at: payload_created_at(&row.payload),
                    id: row.id,
                    payload: row.payload,
                })
            })
            .collect();

        debug!(
            collection = %spec.name,
            scanned,
            candidates = hits.len(),
            k,
            "in-process vector scan"
        );
        Ok(top_k(hits, k))
    }

    async fn delete(&self, spec: &CollectionSpec, id: &str) -> Result<(), StoreError> {
        self.bounded(self.rows.clear(&spec.name, id)).await
    }
}
