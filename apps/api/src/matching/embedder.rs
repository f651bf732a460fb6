//! Embedder — turns arbitrary-length text into one fixed-size vector.
//!
//! The underlying model is a `FeatureExtractor` returning `N * D` raw values (one row
//! per token, or a single already-pooled row). The model is built by a `ModelLoader`
//! at most once per process, on first use; concurrent first callers wait on the same
//! initialisation instead of racing into duplicate loads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::matching::errors::EmbeddingError;

/// Dimension of the default sentence model (all-MiniLM-L6-v2).
pub const DEFAULT_DIMENSION: usize = 384;

/// A loaded feature-extraction model.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Raw model output for `text`, flattened row-major (`N` rows of `D` values).
    async fn extract(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Builds the model. Called at most once per `Embedder`.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Model name for logs.
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Arc<dyn FeatureExtractor>, EmbeddingError>;
}

pub struct Embedder {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn FeatureExtractor>>,
    dimension: usize,
    timeout: Duration,
}

impl Embedder {
    pub fn new(loader: Arc<dyn ModelLoader>, dimension: usize, timeout: Duration) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            dimension,
            timeout,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds `text` into exactly `dimension` values.
    ///
    /// Whitespace-only text is rejected before the model is touched.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        let model = self.model().await?;
        let raw = tokio::time::timeout(self.timeout, model.extract(text))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))??;

        let vector = mean_pool(&raw, self.dimension)?;
        debug!(
            tokens = raw.len() / self.dimension,
            dimension = self.dimension,
            "embedded text"
        );
        Ok(vector)
    }

    async fn model(&self) -> Result<&Arc<dyn FeatureExtractor>, EmbeddingError> {
        self.model
            .get_or_try_init(|| async {
                info!("Loading embedding model '{}'...", self.loader.name());
                let model = self.loader.load().await?;
                info!("Embedding model '{}' ready", self.loader.name());
                Ok::<_, EmbeddingError>(model)
            })
            .await
    }
}

/// Collapses `N * dimension` raw values into `dimension` values by per-dimension
/// arithmetic mean. A raw output of exactly `dimension` values is returned unchanged.
pub fn mean_pool(raw: &[f32], dimension: usize) -> Result<Vec<f32>, EmbeddingError> {
    if dimension == 0 || raw.is_empty() || raw.len() % dimension != 0 {
        return Err(EmbeddingError::Shape {
            len: raw.len(),
            dimension,
        });
    }

    let rows = raw.len() / dimension;
    if rows == 1 {
        return Ok(raw.to_vec());
    }

    let mut sums = vec![0.0_f64; dimension];
    for row in raw.chunks_exact(dimension) {
        for (sum, value) in sums.iter_mut().zip(row) {
            *sum += f64::from(*value);
        }
    }

    Ok(sums.into_iter().map(|s| (s / rows as f64) as f32).collect())
}
