//! Remote backend for a Qdrant-compatible vector database (REST API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::matching::errors::StoreError;
use crate::matching::ranking::{top_k, SCORE_TIE_EPSILON};
use crate::matching::store::{
    payload_created_at, CollectionSpec, ScoredResult, VectorRecord, VectorStore,
};

/// Payload key holding the caller's opaque id.
const RECORD_ID_KEY: &str = "record_id";

/// Hits requested beyond `k`, so near-ties just past the cutoff take part in the tie-break.
const TIE_OVERFETCH: usize = 8;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Debug, Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct PointHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

pub struct RemoteVectorStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteVectorStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Response, StoreError> {
        builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// One search round trip returning at most `limit` hits in server order.
    async fn fetch_hits(
        &self,
        spec: &CollectionSpec,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredResult>, StoreError> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{}/points/search", spec.name),
                )
                .json(&SearchRequest {
                    vector: query,
                    limit,
                    with_payload: true,
                }),
            )
            .await?;
        let response = ensure_success(response).await?;
        let envelope: Envelope<Vec<PointHit>> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .map(|hit| {
                let payload = hit.payload.unwrap_or(Value::Null);
                let id = payload
                    .get(RECORD_ID_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| match &hit.id {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                ScoredResult {
                    id,
                    score: hit.score,
                    created_at: payload_created_at(&payload),
                    payload,
                }
            })
            .collect())
    }

    async fn collection_size(&self, name: &str) -> Result<Option<usize>, StoreError> {
        let response = self
            .send(self.request(reqwest::Method::GET, &format!("/collections/{name}")))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let envelope: Envelope<CollectionInfo> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(envelope.result.map(|info| info.config.params.vectors.size))
    }
}

#[async_trait]
impl VectorStore for RemoteVectorStore {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        match self.collection_size(&spec.name).await? {
            Some(size) if size == spec.dimension => return Ok(()),
            Some(size) => {
                return Err(StoreError::DimensionMismatch {
                    collection: spec.name.clone(),
                    expected: spec.dimension,
                    actual: size,
                })
            }
            None => {}
        }

        let body = json!({
            "vectors": { "size": spec.dimension, "distance": spec.distance.as_str() }
        });
        let response = self
            .send(
                self.request(reqwest::Method::PUT, &format!("/collections/{}", spec.name))
                    .json(&body),
            )
            .await?;

        // Another writer may have created it between the check and the create.
        if response.status() == StatusCode::CONFLICT {
            debug!("Collection '{}' created concurrently", spec.name);
            return Ok(());
        }
        ensure_success(response).await?;
        info!(
            "Created remote collection '{}' (dimension {})",
            spec.name, spec.dimension
        );
        Ok(())
    }

    async fn upsert(&self, spec: &CollectionSpec, record: VectorRecord) -> Result<(), StoreError> {
        if record.vector.len() != spec.dimension {
            return Err(StoreError::InvalidVector {
                expected: spec.dimension,
                actual: record.vector.len(),
            });
        }
        self.ensure_collection(spec).await?;

        let mut payload = match record.payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        payload.insert(RECORD_ID_KEY.to_string(), Value::String(record.id.clone()));

        let body = json!({
            "points": [{
                "id": point_id(&record.id),
                "vector": record.vector,
                "payload": payload,
            }]
        });
        let response = self
            .send(
                self.request(
                    reqwest::Method::PUT,
                    &format!("/collections/{}/points?wait=true", spec.name),
                )
                .json(&body),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn search(
        &self,
        spec: &CollectionSpec,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredResult>, StoreError> {
        self.ensure_collection(spec).await?;

        let mut limit = k.saturating_add(TIE_OVERFETCH);
        loop {
            let hits = self.fetch_hits(spec, query, limit).await?;
            if hits.len() >= limit && cutoff_is_open(&hits, k) {
                limit = limit.saturating_mul(2);
                debug!(collection = %spec.name, limit, "near-ties at the cutoff, widening search");
                continue;
            }
            debug!(collection = %spec.name, hits = hits.len(), k, "remote vector search");
            return Ok(top_k(hits, k));
        }
    }

    async fn delete(&self, spec: &CollectionSpec, id: &str) -> Result<(), StoreError> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{}/points/delete?wait=true", spec.name),
                )
                .json(&json!({ "points": [point_id(id)] })),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!("Delete of '{id}' skipped: collection '{}' is missing", spec.name);
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }
}

/// True when the lowest fetched score may still tie with the `k`-th best, so hits the
/// server did not return could rank inside the top `k`.
fn cutoff_is_open(hits: &[ScoredResult], k: usize) -> bool {
    if k == 0 || hits.len() <= k {
        return false;
    }
    let mut scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    let kth = scores[k - 1];
    let lowest = scores[scores.len() - 1];
    kth - lowest < SCORE_TIE_EPSILON
}

/// Point ids must be unsigned integers or UUIDs; other ids get a stable UUIDv5.
fn point_id(id: &str) -> Value {
    if let Ok(n) = id.parse::<u64>() {
        return json!(n);
    }
    let uuid = Uuid::parse_str(id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()));
    Value::String(uuid.to_string())
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        warn!("Vector store returned {}: {}", status, message);
    }
    Err(StoreError::Backend {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::test_support::memory_store;
    use httpmock::prelude::*;

    fn collection_info(size: usize) -> Value {
        json!({
            "result": {
                "status": "green",
                "config": { "params": { "vectors": { "size": size, "distance": "Cosine" } } }
            },
            "status": "ok",
            "time": 0.001
        })
    }

    fn store_for(server: &MockServer) -> RemoteVectorStore {
        RemoteVectorStore::new(server.base_url(), None, Duration::from_secs(5))
    }

    #[test]
    fn point_ids_keep_numbers_and_uuids() {
        assert_eq!(point_id("42"), json!(42));
        let uuid = "6f1c1c3e-8f7a-4f43-9a59-0b8e3b8f5b11";
        assert_eq!(point_id(uuid), json!(uuid));
    }

    #[test]
    fn opaque_point_ids_are_stable_uuids() {
        let first = point_id("job-abc");
        assert_eq!(first, point_id("job-abc"));
        assert_ne!(first, point_id("job-abd"));
        assert!(Uuid::parse_str(first.as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn ensure_collection_creates_when_missing() {
        let server = MockServer::start_async().await;
        let get = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(404)
                    .json_body(json!({"status": {"error": "Not found"}}));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/jobs");
                then.status(200).json_body(json!({"result": true, "status": "ok"}));
            })
            .await;

        store_for(&server)
            .ensure_collection(&CollectionSpec::cosine("jobs", 384))
            .await
            .unwrap();

        get.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_collection_treats_null_result_as_missing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(200).json_body(json!({"result": null, "status": "ok"}));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/jobs");
                then.status(200).json_body(json!({"result": true}));
            })
            .await;

        store_for(&server)
            .ensure_collection(&CollectionSpec::cosine("jobs", 384))
            .await
            .unwrap();
        create.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_collection_is_a_no_op_when_present() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(200).json_body(collection_info(384));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/jobs");
                then.status(200).json_body(json!({"result": true}));
            })
            .await;

        store_for(&server)
            .ensure_collection(&CollectionSpec::cosine("jobs", 384))
            .await
            .unwrap();
        assert_eq!(create.hits_async().await, 0);
    }

    #[tokio::test]
    async fn ensure_collection_rejects_dimension_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(200).json_body(collection_info(768));
            })
            .await;

        let err = store_for(&server)
            .ensure_collection(&CollectionSpec::cosine("jobs", 384))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 384, actual: 768, .. }
        ));
    }

    #[tokio::test]
    async fn upsert_ensures_collection_then_writes_point() {
        let server = MockServer::start_async().await;
        let get = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(200).json_body(collection_info(2));
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/jobs/points")
                    .query_param("wait", "true");
                then.status(200)
                    .json_body(json!({"result": {"status": "completed"}}));
            })
            .await;

        store_for(&server)
            .upsert(
                &CollectionSpec::cosine("jobs", 2),
                VectorRecord {
                    id: "job-1".into(),
                    vector: vec![0.1, 0.2],
                    payload: json!({"title": "Backend Engineer"}),
                },
            )
            .await
            .unwrap();

        get.assert_async().await;
        put.assert_async().await;
    }

    #[tokio::test]
    async fn search_maps_record_ids_and_applies_tie_breaks() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(200).json_body(collection_info(2));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/jobs/points/search");
                then.status(200).json_body(json!({
                    "result": [
                        {"id": "00000000-0000-0000-0000-000000000001", "score": 0.9,
                         "payload": {"record_id": "old", "created_at": "2024-01-01T00:00:00Z"}},
                        {"id": "00000000-0000-0000-0000-000000000002", "score": 0.89995,
                         "payload": {"record_id": "new", "created_at": "2024-05-01T00:00:00Z"}},
                        {"id": 7, "score": 0.5, "payload": {}}
                    ],
                    "status": "ok"
                }));
            })
            .await;

        let results = store_for(&server)
            .search(&CollectionSpec::cosine("jobs", 2), &[1.0, 0.0], 5)
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "7"]);
    }

    #[tokio::test]
    async fn near_tie_past_the_cutoff_matches_in_process_order() {
        let old = json!({"record_id": "old", "created_at": "2024-01-01T00:00:00Z"});
        let new = json!({"record_id": "new", "created_at": "2024-06-01T00:00:00Z"});
        let spec = CollectionSpec::cosine("jobs", 2);

        let local = memory_store();
        for (id, vector, payload) in [
            ("old", vec![1.0, 0.0], old.clone()),
            ("new", vec![1.0, 0.0045], new.clone()),
        ] {
            local
                .upsert(&spec, VectorRecord { id: id.into(), vector, payload })
                .await
                .unwrap();
        }
        let local_top = local.search(&spec, &[1.0, 0.0], 1).await.unwrap();

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(200).json_body(collection_info(2));
            })
            .await;
        let search = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/jobs/points/search")
                    .json_body_includes(json!({"limit": 1 + TIE_OVERFETCH}).to_string());
                then.status(200).json_body(json!({
                    "result": [
                        {"id": 1, "score": 1.0, "payload": old},
                        {"id": 2, "score": 0.99999, "payload": new}
                    ]
                }));
            })
            .await;
        let remote_top = store_for(&server).search(&spec, &[1.0, 0.0], 1).await.unwrap();

        search.assert_async().await;
        assert_eq!(local_top[0].id, "new");
        assert_eq!(remote_top[0].id, local_top[0].id);
    }

    #[tokio::test]
    async fn search_widens_while_the_cutoff_is_tied() {
        let tied = |ids: &[&str]| -> Value {
            let hits: Vec<Value> = ids
                .iter()
                .enumerate()
                .map(|(n, id)| json!({"id": n, "score": 0.9, "payload": {"record_id": id}}))
                .collect();
            json!({ "result": hits })
        };
        let first_ids: Vec<String> = (1..=1 + TIE_OVERFETCH).map(|n| format!("h{n}")).collect();
        let first: Vec<&str> = first_ids.iter().map(String::as_str).collect();
        let mut second = first.clone();
        second.push("a0");

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(200).json_body(collection_info(2));
            })
            .await;
        let narrow = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/jobs/points/search")
                    .json_body_includes(json!({"limit": 1 + TIE_OVERFETCH}).to_string());
                then.status(200).json_body(tied(&first));
            })
            .await;
        let wide = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/jobs/points/search")
                    .json_body_includes(json!({"limit": 2 * (1 + TIE_OVERFETCH)}).to_string());
                then.status(200).json_body(tied(&second));
            })
            .await;

        let results = store_for(&server)
            .search(&CollectionSpec::cosine("jobs", 2), &[1.0, 0.0], 1)
            .await
            .unwrap();

        assert_eq!(narrow.hits_async().await, 1);
        assert_eq!(wide.hits_async().await, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a0");
    }

    #[test]
    fn cutoff_closes_once_scores_drop_past_epsilon() {
        let hit = |score: f32| ScoredResult {
            id: String::new(),
            score,
            created_at: None,
            payload: Value::Null,
        };
        assert!(cutoff_is_open(&[hit(0.9), hit(0.9), hit(0.89995)], 1));
        assert!(!cutoff_is_open(&[hit(0.9), hit(0.9), hit(0.5)], 1));
        assert!(!cutoff_is_open(&[hit(0.9)], 1));
        assert!(!cutoff_is_open(&[hit(0.9), hit(0.9)], 0));
    }

    #[tokio::test]
    async fn unreachable_store_is_unavailable() {
        let store = RemoteVectorStore::new("http://127.0.0.1:1", None, Duration::from_secs(2));
        let err = store
            .search(&CollectionSpec::cosine("jobs", 2), &[1.0, 0.0], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn server_errors_surface_as_backend_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/jobs");
                then.status(500).body("boom");
            })
            .await;

        let err = store_for(&server)
            .ensure_collection(&CollectionSpec::cosine("jobs", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { status: 500, .. }));
    }
}
