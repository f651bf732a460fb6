pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::matching::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Search
        .route("/api/v1/jobs/search", get(handlers::handle_search))
        .route(
            "/api/v1/jobs/search/titles",
            get(handlers::handle_search_titles),
        )
        .route(
            "/api/v1/jobs/match-resume",
            post(handlers::handle_match_resume),
        )
        .route(
            "/api/v1/jobs/match-resume/pdf",
            post(handlers::handle_match_resume_pdf),
        )
        // Indexing
        .route(
            "/api/v1/jobs/:id/index",
            post(handlers::handle_enqueue_index).delete(handlers::handle_remove_index),
        )
        .route("/api/v1/jobs/reindex", post(handlers::handle_reindex))
        .with_state(state)
}
