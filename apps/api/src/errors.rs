use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::matching::errors::{IndexingError, SearchError, StoreError};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    /// The search itself failed (as opposed to finding nothing).
    #[error("Invalid search: {0}")]
    InvalidSearch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Indexing error: {0}")]
    Indexing(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            e @ (SearchError::InvalidQuery | SearchError::Embedding(_)) => {
                AppError::InvalidSearch(e.to_string())
            }
            SearchError::Store(e) => AppError::StoreUnavailable(e.to_string()),
            SearchError::Hydration(e) => AppError::Internal(e),
        }
    }
}

impl From<IndexingError> for AppError {
    fn from(err: IndexingError) -> Self {
        match err {
            IndexingError::JobNotFound(id) => AppError::NotFound(format!("Job {id} not found")),
            IndexingError::Store(e @ (StoreError::Unavailable(_) | StoreError::Timeout(_))) => {
                AppError::StoreUnavailable(e.to_string())
            }
            IndexingError::Repository(e) => AppError::Internal(e),
            other => AppError::Indexing(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::InvalidSearch(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_SEARCH", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Vector store error: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "The vector store is unavailable".to_string(),
                )
            }
            AppError::Indexing(msg) => {
                tracing::error!("Indexing error: {msg}");
                (StatusCode::BAD_GATEWAY, "INDEXING_ERROR", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::errors::EmbeddingError;

    #[test]
    fn empty_query_and_embed_failure_are_invalid_search() {
        assert!(matches!(
            AppError::from(SearchError::InvalidQuery),
            AppError::InvalidSearch(_)
        ));
        let err = AppError::from(SearchError::Embedding(EmbeddingError::Unavailable(
            "down".into(),
        )));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failures_are_503() {
        let err = AppError::from(SearchError::Store(StoreError::Unavailable("refused".into())));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_job_is_404_and_failed_upsert_is_502() {
        let missing = AppError::from(IndexingError::JobNotFound("42".into()));
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let failed = AppError::from(IndexingError::Store(StoreError::Backend {
            status: 400,
            message: "wrong vector size".into(),
        }));
        assert_eq!(failed.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn unreachable_store_while_indexing_is_503() {
        for err in [
            StoreError::Unavailable("connection refused".into()),
            StoreError::Timeout(std::time::Duration::from_secs(1)),
        ] {
            let response = AppError::from(IndexingError::Store(err)).into_response();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
