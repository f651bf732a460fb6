//! Decoupled indexing: job ids are queued by the CRUD side and drained by one
//! background worker, so a failing embedder or vector store never blocks a save.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::matching::errors::IndexingError;
use crate::matching::indexing::{CancelFlag, IndexingPipeline};

pub const REDIS_QUEUE_KEY: &str = "jobmatch:index_queue";

/// How long one dequeue waits before the worker re-checks its cancel flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

#[async_trait]
pub trait IndexQueue: Send + Sync {
    fn label(&self) -> &'static str;

    async fn enqueue(&self, job_id: &str) -> Result<()>;

    /// Next job id, or `None` if nothing arrived within `wait`.
    async fn dequeue(&self, wait: Duration) -> Result<Option<String>>;
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

/// LPUSH / BRPOP list shared by every API instance.
pub struct RedisIndexQueue {
    client: redis::Client,
    key: String,
}

impl RedisIndexQueue {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            key: REDIS_QUEUE_KEY.to_string(),
        }
    }
}

#[async_trait]
impl IndexQueue for RedisIndexQueue {
    fn label(&self) -> &'static str {
        "redis"
    }

    async fn enqueue(&self, job_id: &str) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        conn.lpush::<_, _, ()>(&self.key, job_id)
            .await
            .context("LPUSH to index queue failed")?;
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<String>> {
        // BRPOP blocks its connection, so it gets one of its own.
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(wait.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .context("BRPOP from index queue failed")?;
        Ok(popped.map(|(_, id)| id))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process
// ────────────────────────────────────────────────────────────────────────────

/// Unbounded tokio channel for single-instance deployments without Redis.
pub struct ChannelIndexQueue {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ChannelIndexQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

impl Default for ChannelIndexQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexQueue for ChannelIndexQueue {
    fn label(&self) -> &'static str {
        "channel"
    }

    async fn enqueue(&self, job_id: &str) -> Result<()> {
        self.tx
            .send(job_id.to_string())
            .context("Index queue receiver dropped")
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<String>> {
        let mut rx = self.rx.lock().await;
        Ok(tokio::time::timeout(wait, rx.recv())
            .await
            .ok()
            .flatten())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Worker
// ────────────────────────────────────────────────────────────────────────────

/// Drains `queue` until `cancel` is set. Failures are logged and dropped;
/// `reindex_all` picks up anything missed.
pub async fn run_index_worker(
    queue: Arc<dyn IndexQueue>,
    pipeline: Arc<IndexingPipeline>,
    cancel: CancelFlag,
) {
    info!("Index worker started ({} queue)", queue.label());

    while !cancel.is_cancelled() {
        let job_id = match queue.dequeue(POLL_INTERVAL).await {
            Ok(Some(id)) => id,
            Ok(None) => continue,
            Err(e) => {
                warn!("Index queue error: {e:#}");
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
        };

        match pipeline.index_by_id(&job_id).await {
            Ok(outcome) => debug!("Index task for job {job_id}: {outcome:?}"),
            Err(IndexingError::JobNotFound(_)) => {
                // Deleted since it was queued.
                if let Err(e) = pipeline.remove(&job_id).await {
                    warn!("Failed to remove vector for deleted job {job_id}: {e}");
                }
            }
            Err(e) => warn!("Failed to index job {job_id}: {e}"),
        }
    }

    info!("Index worker stopped");
}
