//! Query / Ranking Service — text → Embedder → Vector Record Store → ranked hits.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::matching::embedder::Embedder;
use crate::matching::errors::SearchError;
use crate::matching::query_enhancer::QueryEnhancer;
use crate::matching::ranking::rank_results;
use crate::matching::repository::JobRepository;
use crate::matching::store::{CollectionSpec, ScoredResult, VectorStore};
use crate::models::job::JobDisplay;

#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Default k for free-text search.
    pub text_k: usize,
    /// Candidate pool for résumé search; large enough to approximate a full re-rank.
    pub resume_k: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            text_k: 5,
            resume_k: 1000,
        }
    }
}

/// Best score per distinct title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleScore {
    pub title: String,
    pub score: f32,
}

/// A hydrated résumé match: fresh display fields plus the similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobMatch {
    #[serde(flatten)]
    pub job: JobDisplay,
    pub score: f32,
}

pub struct SearchService {
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
    jobs: Arc<dyn JobRepository>,
    enhancer: Arc<dyn QueryEnhancer>,
    collection: CollectionSpec,
    limits: SearchLimits,
}

impl SearchService {
    pub fn new(
        embedder: Arc<Embedder>,
        store: Arc<dyn VectorStore>,
        jobs: Arc<dyn JobRepository>,
        enhancer: Arc<dyn QueryEnhancer>,
        collection: CollectionSpec,
        limits: SearchLimits,
    ) -> Self {
        Self {
            embedder,
            store,
            jobs,
            enhancer,
            collection,
            limits,
        }
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    /// Embeds the raw query and returns up to `k` ranked hits (default `text_k`).
    pub async fn search_by_text(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery);
        }
        let k = k.unwrap_or(self.limits.text_k);
        self.ranked(query, k).await
    }

    /// Like `search_by_text`, collapsed to one entry per title holding its best score.
    pub async fn search_titles(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<TitleScore>, SearchError> {
        let hits = self.search_by_text(query, k).await?;
        Ok(aggregate_titles(&hits))
    }

    /// Finds jobs for a résumé: enhance, embed, rank the whole candidate pool, then
    /// hydrate from the primary store in ranked order. Ids the store no longer
    /// returns (deleted or soft-deleted) are dropped.
    pub async fn search_jobs_by_resume(
        &self,
        resume_text: &str,
    ) -> Result<Vec<JobMatch>, SearchError> {
        if resume_text.trim().is_empty() {
            return Err(SearchError::InvalidQuery);
        }

        let query = self.enhancer.enhance(resume_text).await;
        let hits = self.ranked(&query, self.limits.resume_k).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let mut fresh: HashMap<String, JobDisplay> = self
            .jobs
            .fetch_display_fields(&ids)
            .await
            .map_err(SearchError::Hydration)?
            .into_iter()
            .map(|job| (job.id.clone(), job))
            .collect();

        let matches: Vec<JobMatch> = hits
            .into_iter()
            .filter_map(|hit| {
                fresh.remove(&hit.id).map(|job| JobMatch {
                    job,
                    score: hit.score,
                })
            })
            .collect();

        info!(
            "Résumé search ({} enhancer): {} candidates, {} hydrated",
            self.enhancer.name(),
            ids.len(),
            matches.len()
        );
        Ok(matches)
    }

    async fn ranked(&self, query: &str, k: usize) -> Result<Vec<ScoredResult>, SearchError> {
        let vector = self.embedder.embed(query).await?;
        let mut hits = self.store.search(&self.collection, &vector, k).await?;
        // Backends already rank; re-rank so the order never depends on which one answered.
        rank_results(&mut hits);
        hits.truncate(k);
        debug!(k, hits = hits.len(), backend = self.store.backend(), "vector search");
        Ok(hits)
    }
}

/// Max score per title, highest first (title ascending on equal scores).
/// Hits without a payload title fall back to their id.
pub fn aggregate_titles(hits: &[ScoredResult]) -> Vec<TitleScore> {
    let mut best: HashMap<String, f32> = HashMap::new();
    for hit in hits {
        let title = hit
            .payload
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or(hit.id.as_str())
            .to_string();
        best.entry(title)
            .and_modify(|s| *s = s.max(hit.score))
            .or_insert(hit.score);
    }

    let mut titles: Vec<TitleScore> = best
        .into_iter()
        .map(|(title, score)| TitleScore { title, score })
        .collect();
    titles.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.title.cmp(&b.title)));
    titles
}
