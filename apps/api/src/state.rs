use std::sync::Arc;

use crate::matching::indexing::{CancelFlag, IndexingPipeline};
use crate::matching::queue::IndexQueue;
use crate::matching::search::SearchService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub indexer: Arc<IndexingPipeline>,
    /// Index requests from the CRUD side land here; the background worker drains it.
    pub queue: Arc<dyn IndexQueue>,
    /// Set on shutdown; stops the worker and any running reindex.
    pub cancel: CancelFlag,
}
