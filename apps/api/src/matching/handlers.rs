use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::matching::indexing::ReindexSummary;
use crate::matching::search::{JobMatch, TitleScore};
use crate::matching::store::ScoredResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct ResumeMatchRequest {
    pub resume_text: String,
}

#[derive(Serialize)]
pub struct IndexAccepted {
    pub job_id: String,
    pub status: &'static str,
}

/// `limit` must be positive; values above the résumé candidate pool are capped to it.
fn checked_limit(state: &AppState, limit: Option<usize>) -> Result<Option<usize>, AppError> {
    match limit {
        Some(0) => Err(AppError::Validation("limit must be at least 1".into())),
        Some(n) => Ok(Some(n.min(state.search.limits().resume_k))),
        None => Ok(None),
    }
}

/// GET /api/v1/jobs/search
pub async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ScoredResult>>, AppError> {
    let limit = checked_limit(&state, params.limit)?;
    Ok(Json(state.search.search_by_text(&params.q, limit).await?))
}

/// GET /api/v1/jobs/search/titles
pub async fn handle_search_titles(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<TitleScore>>, AppError> {
    let limit = checked_limit(&state, params.limit)?;
    Ok(Json(state.search.search_titles(&params.q, limit).await?))
}

/// POST /api/v1/jobs/match-resume
pub async fn handle_match_resume(
    State(state): State<AppState>,
    Json(req): Json<ResumeMatchRequest>,
) -> Result<Json<Vec<JobMatch>>, AppError> {
    Ok(Json(state.search.search_jobs_by_resume(&req.resume_text).await?))
}

/// POST /api/v1/jobs/match-resume/pdf (multipart field `file`)
pub async fn handle_match_resume_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<JobMatch>>, AppError> {
    let mut pdf = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
            pdf = Some(bytes);
            break;
        }
    }
    let pdf = pdf.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    // PDF parsing is CPU-bound.
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
        .await
        .map_err(|e| {
            AppError::Internal(anyhow::anyhow!("spawn_blocking failed in PDF extraction: {e}"))
        })?
        .map_err(|e| AppError::Validation(format!("Could not extract text from PDF: {e}")))?;

    Ok(Json(state.search.search_jobs_by_resume(&text).await?))
}

/// POST /api/v1/jobs/:id/index
pub async fn handle_enqueue_index(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<IndexAccepted>), AppError> {
    state.queue.enqueue(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(IndexAccepted {
            job_id: id,
            status: "queued",
        }),
    ))
}

/// DELETE /api/v1/jobs/:id/index
pub async fn handle_remove_index(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.indexer.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/jobs/reindex
pub async fn handle_reindex(
    State(state): State<AppState>,
) -> Result<Json<ReindexSummary>, AppError> {
    info!("Reindex requested");
    Ok(Json(state.indexer.reindex_all_until(&state.cancel).await?))
}
