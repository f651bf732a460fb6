use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

/// Where job vectors live.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorBackend {
    Qdrant { url: String, api_key: Option<String> },
    /// `job_embeddings` table beside the primary records, scanned in-process.
    Postgres,
    /// Process memory, rebuilt by reindexing after a restart.
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing; no model download.
    Hash,
    /// A text-embeddings-inference style HTTP server.
    Http { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryEnhancerKind {
    Regex,
    Llm { api_key: String },
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub vector_backend: VectorBackend,
    pub jobs_collection: String,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_dimension: usize,
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
    pub text_search_limit: usize,
    pub resume_search_limit: usize,
    pub query_enhancer: QueryEnhancerKind,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env { get: &get };

        let vector_backend = match env.or("VECTOR_BACKEND", "postgres").as_str() {
            "qdrant" => VectorBackend::Qdrant {
                url: env.require("QDRANT_URL")?,
                api_key: env.optional("QDRANT_API_KEY"),
            },
            "postgres" => VectorBackend::Postgres,
            "memory" => VectorBackend::Memory,
            other => bail!("VECTOR_BACKEND must be qdrant, postgres or memory, got '{other}'"),
        };

        let embedding_backend = match env.or("EMBEDDING_BACKEND", "hash").as_str() {
            "hash" => EmbeddingBackend::Hash,
            "http" => EmbeddingBackend::Http {
                url: env.require("EMBEDDING_URL")?,
            },
            other => bail!("EMBEDDING_BACKEND must be hash or http, got '{other}'"),
        };

        let query_enhancer = match env.or("QUERY_ENHANCER", "regex").as_str() {
            "regex" => QueryEnhancerKind::Regex,
            "llm" => QueryEnhancerKind::Llm {
                api_key: env.require("ANTHROPIC_API_KEY")?,
            },
            other => bail!("QUERY_ENHANCER must be regex or llm, got '{other}'"),
        };

        let embedding_dimension = env.positive("EMBEDDING_DIMENSION", 384)?;

        Ok(Config {
            database_url: env.require("DATABASE_URL")?,
            redis_url: env.optional("REDIS_URL"),
            port: env.parse("PORT", 8080)?,
            rust_log: env.or("RUST_LOG", "info"),
            vector_backend,
            jobs_collection: env.or("JOBS_COLLECTION", "jobs"),
            embedding_backend,
            embedding_dimension,
            embed_timeout: Duration::from_secs(env.parse("EMBED_TIMEOUT_SECS", 30)?),
            store_timeout: Duration::from_secs(env.parse("STORE_TIMEOUT_SECS", 10)?),
            text_search_limit: env.positive("TEXT_SEARCH_LIMIT", 5)?,
            resume_search_limit: env.positive("RESUME_SEARCH_LIMIT", 1000)?,
            query_enhancer,
        })
    }
}

struct Env<'a> {
    get: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    /// Set and non-blank.
    fn optional(&self, key: &str) -> Option<String> {
        (self.get)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| anyhow!("Required environment variable '{key}' is not set"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key)
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
            None => Ok(default),
        }
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize> {
        let value: usize = self.parse(key, default)?;
        if value == 0 {
            bail!("{key} must be greater than zero");
        }
        Ok(value)
    }
}
