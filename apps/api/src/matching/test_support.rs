//! Fakes shared by the matching tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;

use crate::matching::embedder::{FeatureExtractor, ModelLoader};
use crate::matching::errors::EmbeddingError;
use crate::matching::repository::JobRepository;
use crate::matching::store::{InProcessVectorStore, MemoryVectorRows, VectorStore};
use crate::models::job::{JobDisplay, JobPosting};

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

/// A posting created on 2024-01-01 with only title and description set.
pub fn job(id: &str, title: &str, description: &str) -> JobPosting {
    JobPosting {
        id: id.to_string(),
        title: title.to_string(),
        description: Some(description.to_string()),
        requirements: None,
        responsibilities: None,
        location: Some("Berlin".to_string()),
        is_remote: false,
        company_name: Some("Acme".to_string()),
        company_logo: None,
        type_name: Some("Full-time".to_string()),
        created_at: at(1),
        updated_at: at(1),
    }
}

pub fn display(job: &JobPosting) -> JobDisplay {
    JobDisplay {
        id: job.id.clone(),
        title: job.title.clone(),
        location: job.location.clone(),
        is_remote: job.is_remote,
        company_name: job.company_name.clone(),
        company_logo: job.company_logo.clone(),
        type_name: job.type_name.clone(),
        created_at: job.created_at,
        updated_at: job.updated_at,
    }
}

pub fn memory_store() -> Arc<dyn VectorStore> {
    Arc::new(InProcessVectorStore::new(
        Arc::new(MemoryVectorRows::new()),
        Duration::from_secs(5),
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Jobs
// ────────────────────────────────────────────────────────────────────────────

/// Primary store stand-in. `soft_delete` hides a job from every read.
#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<HashMap<String, JobPosting>>,
    deleted: RwLock<Vec<String>>,
    fail_reads: AtomicBool,
}

impl MemoryJobRepository {
    pub fn new(jobs: Vec<JobPosting>) -> Self {
        let repo = Self::default();
        for job in jobs {
            repo.put(job);
        }
        repo
    }

    pub fn put(&self, job: JobPosting) {
        self.jobs.write().insert(job.id.clone(), job);
    }

    pub fn soft_delete(&self, id: &str) {
        self.deleted.write().push(id.to_string());
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn visible(&self) -> Result<Vec<JobPosting>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        let deleted = self.deleted.read();
        let mut jobs: Vec<JobPosting> = self
            .jobs
            .read()
            .values()
            .filter(|j| !deleted.contains(&j.id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn fetch_fields(&self, id: &str) -> Result<Option<JobPosting>> {
        Ok(self.visible()?.into_iter().find(|j| j.id == id))
    }

    async fn fetch_all_with_fields(&self) -> Result<Vec<JobPosting>> {
        self.visible()
    }

    async fn fetch_display_fields(&self, ids: &[String]) -> Result<Vec<JobDisplay>> {
        // Reverse order so callers can't lean on the store's ordering.
        Ok(self
            .visible()?
            .iter()
            .rev()
            .filter(|j| ids.contains(&j.id))
            .map(display)
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Models
// ────────────────────────────────────────────────────────────────────────────

/// Returns the same raw output for every input.
pub struct ScriptedExtractor {
    output: Vec<f32>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn constant(output: Vec<f32>) -> Self {
        Self {
            output,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureExtractor for ScriptedExtractor {
    async fn extract(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

pub struct SlowExtractor {
    pub delay: Duration,
}

#[async_trait]
impl FeatureExtractor for SlowExtractor {
    async fn extract(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![0.0])
    }
}

pub struct FailingExtractor;

#[async_trait]
impl FeatureExtractor for FailingExtractor {
    async fn extract(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Inference("model crashed".into()))
    }
}

/// Hands out a fixed extractor and counts how often it was asked to.
pub struct CountingLoader {
    extractor: Arc<dyn FeatureExtractor>,
    delay: Duration,
    fail_first: usize,
    loads: AtomicUsize,
}

impl CountingLoader {
    pub fn new(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            extractor,
            delay: Duration::ZERO,
            fail_first: 0,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    fn name(&self) -> &str {
        "counting"
    }

    async fn load(&self) -> Result<Arc<dyn FeatureExtractor>, EmbeddingError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if attempt < self.fail_first {
            return Err(EmbeddingError::Unavailable("weights not downloaded".into()));
        }
        Ok(self.extractor.clone())
    }
}
