mod config;
mod db;
mod errors;
mod llm_client;
mod matching;
mod models;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, EmbeddingBackend, QueryEnhancerKind, VectorBackend};
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::matching::embedder::{Embedder, ModelLoader};
use crate::matching::extractors::{HashModelLoader, HttpModelLoader};
use crate::matching::indexing::{CancelFlag, IndexingPipeline};
use crate::matching::query_enhancer::{LlmQueryEnhancer, QueryEnhancer, RoleKeywordEnhancer};
use crate::matching::queue::{run_index_worker, ChannelIndexQueue, IndexQueue, RedisIndexQueue};
use crate::matching::repository::PgJobRepository;
use crate::matching::search::{SearchLimits, SearchService};
use crate::matching::store::{
    CollectionSpec, InProcessVectorStore, MemoryVectorRows, PgVectorRows, RemoteVectorStore,
    VectorStore,
};
use crate::routes::build_router;
use crate::state::AppState;

/// Grace period for the index worker to finish its current job on shutdown.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jobmatch API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (primary job records, and vectors for the postgres backend)
    let db = create_pool(&config.database_url).await?;

    // Embedder: the model itself loads lazily on first use
    let loader: Arc<dyn ModelLoader> = match &config.embedding_backend {
        EmbeddingBackend::Hash => Arc::new(HashModelLoader {
            dimension: config.embedding_dimension,
        }),
        EmbeddingBackend::Http { url } => Arc::new(HttpModelLoader {
            url: url.clone(),
            dimension: config.embedding_dimension,
            timeout: config.embed_timeout,
        }),
    };
    let model_name = loader.name().to_string();
    let embedder = Arc::new(Embedder::new(
        loader,
        config.embedding_dimension,
        config.embed_timeout,
    ));
    info!(
        "Embedder configured (model: {model_name}, dimension: {})",
        embedder.dimension()
    );

    // Vector record store
    let store: Arc<dyn VectorStore> = match &config.vector_backend {
        VectorBackend::Qdrant { url, api_key } => Arc::new(RemoteVectorStore::new(
            url.clone(),
            api_key.clone(),
            config.store_timeout,
        )),
        VectorBackend::Postgres => Arc::new(InProcessVectorStore::new(
            Arc::new(PgVectorRows::new(db.clone())),
            config.store_timeout,
        )),
        VectorBackend::Memory => Arc::new(InProcessVectorStore::new(
            Arc::new(MemoryVectorRows::new()),
            config.store_timeout,
        )),
    };
    let collection = CollectionSpec::cosine(&config.jobs_collection, config.embedding_dimension);
    match store.ensure_collection(&collection).await {
        Ok(()) => info!(
            "Vector store ready ({}, collection '{}')",
            store.backend(),
            collection.name
        ),
        // Not fatal: every upsert and search ensures the collection again.
        Err(e) => warn!("Vector store not ready at startup ({}): {e}", store.backend()),
    }

    let jobs = Arc::new(PgJobRepository::new(db));

    // Query enhancer for résumé search
    let enhancer: Arc<dyn QueryEnhancer> = match &config.query_enhancer {
        QueryEnhancerKind::Regex => Arc::new(RoleKeywordEnhancer::new()),
        QueryEnhancerKind::Llm { api_key } => {
            let llm = LlmClient::new(api_key.clone());
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmQueryEnhancer::new(llm))
        }
    };

    let indexer = Arc::new(IndexingPipeline::new(
        embedder.clone(),
        store.clone(),
        jobs.clone(),
        collection.clone(),
    ));
    let search = Arc::new(SearchService::new(
        embedder,
        store,
        jobs,
        enhancer,
        collection,
        SearchLimits {
            text_k: config.text_search_limit,
            resume_k: config.resume_search_limit,
        },
    ));

    // Index queue + background worker
    let queue: Arc<dyn IndexQueue> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
            info!("Redis index queue initialized");
            Arc::new(RedisIndexQueue::new(client))
        }
        None => {
            info!("REDIS_URL not set; using in-process index queue");
            Arc::new(ChannelIndexQueue::new())
        }
    };
    let cancel = CancelFlag::new();
    let worker = tokio::spawn(run_index_worker(
        queue.clone(),
        indexer.clone(),
        cancel.clone(),
    ));

    // Memory vectors do not survive a restart
    if config.vector_backend == VectorBackend::Memory {
        let indexer = indexer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = indexer.reindex_all_until(&cancel).await {
                warn!("Initial reindex failed: {e}");
            }
        });
    }

    // Build app state
    let state = AppState {
        search,
        indexer,
        queue,
        cancel: cancel.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    if tokio::time::timeout(WORKER_SHUTDOWN_GRACE, worker).await.is_err() {
        warn!("Index worker did not stop within {WORKER_SHUTDOWN_GRACE:?}");
    }
    info!("Shut down cleanly");
    Ok(())
}

/// Resolves on Ctrl-C and cancels background work.
async fn shutdown_signal(cancel: CancelFlag) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    cancel.cancel();
}
