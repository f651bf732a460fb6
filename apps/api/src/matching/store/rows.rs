//! Vector rows kept beside the primary records, scanned by `InProcessVectorStore`.
//!
//! Every write replaces a whole row in one step (a single SQL statement, or one
//! insert under the write lock), so a concurrent scan sees either the old or the new
//! vector of a record, never a mix.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tokio::sync::OnceCell;
use tracing::info;

use crate::matching::errors::StoreError;
use crate::matching::store::{CollectionSpec, VectorRecord};

/// One stored row. `vector` is `None` once the record's vector has been removed.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredRow {
    #[sqlx(rename = "record_id")]
    pub id: String,
    #[sqlx(rename = "embedding")]
    pub vector: Option<Vec<f32>>,
    pub payload: Value,
}

#[async_trait]
pub trait VectorRows: Send + Sync {
    fn label(&self) -> &'static str;

    /// Registers the collection. Fails if it is registered with another dimension.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError>;

    /// Replaces the row at `record.id` with the new vector and payload.
    async fn write(&self, collection: &str, record: &VectorRecord) -> Result<(), StoreError>;

    /// Snapshot of every row in the collection, with or without a vector.
    async fn scan(&self, collection: &str) -> Result<Vec<StoredRow>, StoreError>;

    /// Clears the vector of `id`. The row stays, so scans skip it.
    async fn clear(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

pub struct PgVectorRows {
    pool: PgPool,
    bootstrapped: OnceCell<()>,
}

impl PgVectorRows {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            bootstrapped: OnceCell::new(),
        }
    }

    /// Creates the backing tables once per process. A failed attempt is retried on the
    /// next call.
    async fn bootstrap(&self) -> Result<(), StoreError> {
        self.bootstrapped
            .get_or_try_init(|| self.create_tables())
            .await
            .map(|_| ())
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_collections (
                name        TEXT PRIMARY KEY,
                dimension   INTEGER NOT NULL,
                distance    TEXT NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_embeddings (
                collection  TEXT NOT NULL REFERENCES vector_collections (name) ON DELETE CASCADE,
                record_id   TEXT NOT NULL,
                embedding   REAL[],
                payload     JSONB NOT NULL DEFAULT '{}'::jsonb,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (collection, record_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorRows for PgVectorRows {
    fn label(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        self.bootstrap().await?;

        let created = sqlx::query(
            r#"
            INSERT INTO vector_collections (name, dimension, distance)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&spec.name)
        .bind(spec.dimension as i32)
        .bind(spec.distance.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if created > 0 {
            info!(
                "Created vector collection '{}' (dimension {})",
                spec.name, spec.dimension
            );
            return Ok(());
        }

        let dimension: i32 =
            sqlx::query_scalar("SELECT dimension FROM vector_collections WHERE name = $1")
                .bind(&spec.name)
                .fetch_one(&self.pool)
                .await?;

        if dimension as usize != spec.dimension {
            return Err(StoreError::DimensionMismatch {
                collection: spec.name.clone(),
                expected: spec.dimension,
                actual: dimension as usize,
            });
        }
        Ok(())
    }

    async fn write(&self, collection: &str, record: &VectorRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_embeddings (collection, record_id, embedding, payload, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (collection, record_id) DO UPDATE
            SET embedding = EXCLUDED.embedding,
                payload = EXCLUDED.payload,
                updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(&record.id)
        .bind(&record.vector)
        .bind(&record.payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan(&self, collection: &str) -> Result<Vec<StoredRow>, StoreError> {
        Ok(sqlx::query_as::<_, StoredRow>(
            "SELECT record_id, embedding, payload FROM job_embeddings WHERE collection = $1",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn clear(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE job_embeddings
            SET embedding = NULL, updated_at = now()
            WHERE collection = $1 AND record_id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Memory
// ────────────────────────────────────────────────────────────────────────────

struct MemoryCollection {
    dimension: usize,
    rows: HashMap<String, StoredRow>,
}

/// Process-local rows for single-node deployments. Lost on restart; `reindex_all`
/// rebuilds them.
#[derive(Default)]
pub struct MemoryVectorRows {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryVectorRows {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorRows for MemoryVectorRows {
    fn label(&self) -> &'static str {
        "memory"
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let collection = collections
            .entry(spec.name.clone())
            .or_insert_with(|| MemoryCollection {
                dimension: spec.dimension,
                rows: HashMap::new(),
            });

        if collection.dimension != spec.dimension {
            return Err(StoreError::DimensionMismatch {
                collection: spec.name.clone(),
                expected: spec.dimension,
                actual: collection.dimension,
            });
        }
        Ok(())
    }

    async fn write(&self, collection: &str, record: &VectorRecord) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::Backend {
                status: 404,
                message: format!("collection '{collection}' does not exist"),
            })?;
        target.rows.insert(
            record.id.clone(),
            StoredRow {
                id: record.id.clone(),
                vector: Some(record.vector.clone()),
                payload: record.payload.clone(),
            },
        );
        Ok(())
    }

    async fn scan(&self, collection: &str) -> Result<Vec<StoredRow>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(row) = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|c| c.rows.get_mut(id))
        {
            row.vector = None;
        }
        Ok(())
    }
}
