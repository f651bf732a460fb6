//! Feature-extraction models behind the `Embedder`.
//!
//! - `HashFeatureExtractor`: deterministic in-process model (feature hashing, no training).
//! - `HttpFeatureExtractor`: a remote feature-extraction endpoint returning token embeddings.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use tracing::warn;

use crate::matching::embedder::{FeatureExtractor, ModelLoader};
use crate::matching::errors::EmbeddingError;

// ────────────────────────────────────────────────────────────────────────────
// Hashing model
// ────────────────────────────────────────────────────────────────────────────

/// Fixed SipHash keys. Changing them changes every stored vector — reindex afterwards.
const HASH_SEED_K0: u64 = 0x6a6f_626d_6174_6368;
const HASH_SEED_K1: u64 = 0x656d_6265_6464_6572;

/// Emits one row per token: a one-hot vector at the token's hash bucket.
/// Mean pooling over the rows yields the token-frequency profile of the text.
pub struct HashFeatureExtractor {
    dimension: usize,
}

impl HashFeatureExtractor {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        (hasher.finish() % self.dimension as u64) as usize
    }

    fn features(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; self.dimension];
        }

        let mut raw = vec![0.0_f32; tokens.len() * self.dimension];
        for (row, token) in tokens.iter().enumerate() {
            raw[row * self.dimension + self.bucket(token)] = 1.0;
        }
        raw
    }
}

#[async_trait]
impl FeatureExtractor for HashFeatureExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.features(text))
    }
}

/// Lower-cased alphanumeric runs. `Node.js` becomes `node`, `js`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub struct HashModelLoader {
    pub dimension: usize,
}

#[async_trait]
impl ModelLoader for HashModelLoader {
    fn name(&self) -> &str {
        "hash-v1"
    }

    async fn load(&self) -> Result<Arc<dyn FeatureExtractor>, EmbeddingError> {
        Ok(Arc::new(HashFeatureExtractor::new(self.dimension)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Remote feature-extraction endpoint
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct FeatureRequest<'a> {
    inputs: &'a str,
    truncate: bool,
}

/// Accepted response shapes: pooled `[D]`, per-token `[N][D]`, or batched `[1][N][D]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureResponse {
    Pooled(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
    Batched(Vec<Vec<Vec<f32>>>),
}

impl FeatureResponse {
    fn into_flat(self) -> Vec<f32> {
        match self {
            FeatureResponse::Pooled(v) => v,
            FeatureResponse::Tokens(rows) => rows.into_iter().flatten().collect(),
            FeatureResponse::Batched(batch) => batch
                .into_iter()
                .next()
                .map(|rows| rows.into_iter().flatten().collect())
                .unwrap_or_default(),
        }
    }
}

pub struct HttpFeatureExtractor {
    client: Client,
    url: String,
}

impl HttpFeatureExtractor {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeatureExtractor for HttpFeatureExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.url)
            .json(&FeatureRequest {
                inputs: text,
                truncate: true,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Feature extraction endpoint returned {}: {}", status, body);
            return Err(EmbeddingError::Inference(format!("status {status}: {body}")));
        }

        let parsed: FeatureResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Inference(format!("invalid response body: {e}")))?;
        Ok(parsed.into_flat())
    }
}

/// Builds the HTTP client and probes the endpoint once, checking the output shape.
pub struct HttpModelLoader {
    pub url: String,
    pub dimension: usize,
    pub timeout: Duration,
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    fn name(&self) -> &str {
        &self.url
    }

    async fn load(&self) -> Result<Arc<dyn FeatureExtractor>, EmbeddingError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
        let extractor = HttpFeatureExtractor::new(client, self.url.clone());

        let probe = extractor.extract("warm up").await?;
        if probe.is_empty() || probe.len() % self.dimension != 0 {
            return Err(EmbeddingError::Shape {
                len: probe.len(),
                dimension: self.dimension,
            });
        }

        Ok(Arc::new(extractor))
    }
}
