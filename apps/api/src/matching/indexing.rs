//! Indexing Pipeline — job posting text → Embedder → Vector Record Store.
//!
//! Indexing is best-effort: the CRUD layer enqueues ids (see `queue`) and never waits
//! on the result. Direct callers of `index` still get the error. `reindex_all` is the
//! recovery path and never aborts on a single bad record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::matching::embedder::Embedder;
use crate::matching::errors::IndexingError;
use crate::matching::repository::JobRepository;
use crate::matching::store::{CollectionSpec, VectorRecord, VectorStore};
use crate::models::job::{JobPayload, JobPosting};

/// Title repetitions ahead of the body, so title terms dominate the pooled vector.
const TITLE_WEIGHT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed,
    /// Nothing embeddable; no vector was written.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexSummary {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Cooperative cancellation for long batches. Cloned handles share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builds the text to embed: title three times, then description, requirements and
/// responsibilities. Blank fields are dropped.
pub fn build_embeddable_text(job: &JobPosting) -> String {
    let title = job.title.trim();
    let body = [&job.description, &job.requirements, &job.responsibilities]
        .into_iter()
        .filter_map(|field| field.as_deref().map(str::trim))
        .filter(|field| !field.is_empty());

    std::iter::repeat(title)
        .take(TITLE_WEIGHT)
        .filter(|t| !t.is_empty())
        .chain(body)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct IndexingPipeline {
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
    jobs: Arc<dyn JobRepository>,
    collection: CollectionSpec,
}

impl IndexingPipeline {
    pub fn new(
        embedder: Arc<Embedder>,
        store: Arc<dyn VectorStore>,
        jobs: Arc<dyn JobRepository>,
        collection: CollectionSpec,
    ) -> Self {
        Self {
            embedder,
            store,
            jobs,
            collection,
        }
    }

    /// Embeds and upserts one job posting.
    pub async fn index(&self, job: &JobPosting) -> Result<IndexOutcome, IndexingError> {
        let text = build_embeddable_text(job);
        if text.trim().is_empty() {
            debug!("Job {} has no embeddable text; skipping", job.id);
            return Ok(IndexOutcome::Skipped);
        }

        let vector = self.embedder.embed(&text).await?;
        let payload = serde_json::to_value(JobPayload::from(job))
            .map_err(|e| IndexingError::Repository(e.into()))?;

        self.store
            .upsert(
                &self.collection,
                VectorRecord {
                    id: job.id.clone(),
                    vector,
                    payload,
                },
            )
            .await?;

        debug!(
            "Indexed job {} into '{}' ({})",
            job.id,
            self.collection.name,
            self.store.backend()
        );
        Ok(IndexOutcome::Indexed)
    }

    /// Fetches the job's current fields from the primary store, then indexes it.
    pub async fn index_by_id(&self, id: &str) -> Result<IndexOutcome, IndexingError> {
        let job = self
            .jobs
            .fetch_fields(id)
            .await
            .map_err(IndexingError::Repository)?
            .ok_or_else(|| IndexingError::JobNotFound(id.to_string()))?;
        self.index(&job).await
    }

    /// Hard-deletes the job's vector record.
    pub async fn remove(&self, id: &str) -> Result<(), IndexingError> {
        self.store.delete(&self.collection, id).await?;
        info!("Removed job {} from '{}'", id, self.collection.name);
        Ok(())
    }

    pub async fn reindex_all(&self) -> Result<ReindexSummary, IndexingError> {
        self.reindex_all_until(&CancelFlag::new()).await
    }

    /// Re-embeds every job. Per-item failures are logged and counted; the flag is
    /// checked between items, and each item's upsert stands on its own.
    pub async fn reindex_all_until(
        &self,
        cancel: &CancelFlag,
    ) -> Result<ReindexSummary, IndexingError> {
        let jobs = self
            .jobs
            .fetch_all_with_fields()
            .await
            .map_err(IndexingError::Repository)?;

        let mut summary = ReindexSummary {
            total: jobs.len(),
            ..Default::default()
        };
        info!(
            "Reindexing {} jobs into '{}' ({})",
            summary.total,
            self.collection.name,
            self.store.backend()
        );

        for job in &jobs {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                warn!(
                    "Reindex cancelled after {} of {} jobs",
                    summary.updated + summary.skipped + summary.failed,
                    summary.total
                );
                break;
            }

            match self.index(job).await {
                Ok(IndexOutcome::Indexed) => summary.updated += 1,
                Ok(IndexOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!("Failed to reindex job {}: {e}", job.id);
                    summary.failed += 1;
                }
            }
        }

        info!(
            total = summary.total,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Reindex finished"
        );
        Ok(summary)
    }
}
