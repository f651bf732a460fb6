use std::time::Duration;

use thiserror::Error;

/// Failures of the embedding model or of pooling its output.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("text is empty after trimming")]
    EmptyText,

    #[error("embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("embedding inference failed: {0}")]
    Inference(String),

    #[error("embedding model did not respond within {0:?}")]
    Timeout(Duration),

    #[error("model output of length {len} is not a multiple of dimension {dimension}")]
    Shape { len: usize, dimension: usize },
}

/// Failures of a vector record store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("vector store returned status {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("collection '{collection}' has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("vector of length {actual} does not match collection dimension {expected}")]
    InvalidVector { expected: usize, actual: usize },

    #[error("vector store did not respond within {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed vector store response: {0}")]
    Decode(String),
}

/// Failures while turning a job posting into a stored vector.
#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("upsert failed: {0}")]
    Store(#[from] StoreError),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job repository error: {0}")]
    Repository(#[source] anyhow::Error),
}

/// Failures of the query/ranking service.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search query is empty")]
    InvalidQuery,

    #[error("could not embed search query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector search failed: {0}")]
    Store(#[from] StoreError),

    #[error("failed to hydrate search results: {0}")]
    Hydration(#[source] anyhow::Error),
}
