//! Read access to the primary job records owned by the CRUD layer.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::job::{JobDisplay, JobPosting};

/// The slice of the primary store the matching core depends on.
/// Soft-deleted jobs are invisible through every method.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn fetch_fields(&self, id: &str) -> Result<Option<JobPosting>>;

    async fn fetch_all_with_fields(&self) -> Result<Vec<JobPosting>>;

    /// Display fields for the ids that still exist, in no particular order.
    async fn fetch_display_fields(&self, ids: &[String]) -> Result<Vec<JobDisplay>>;
}

const JOB_POSTING_SELECT: &str = r#"
    SELECT j.id, j.title, j.description, j.requirements, j.responsibilities,
           j.location, j.is_remote,
           c.name AS company_name, c.logo_url AS company_logo,
           t.name AS type_name,
           j.created_at, j.updated_at
    FROM jobs j
    LEFT JOIN companies c ON c.id = j.company_id
    LEFT JOIN job_types t ON t.id = j.job_type_id
"#;

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn fetch_fields(&self, id: &str) -> Result<Option<JobPosting>> {
        let sql = format!("{JOB_POSTING_SELECT} WHERE j.id = $1 AND j.deleted_at IS NULL");
        Ok(sqlx::query_as::<_, JobPosting>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn fetch_all_with_fields(&self) -> Result<Vec<JobPosting>> {
        let sql = format!("{JOB_POSTING_SELECT} WHERE j.deleted_at IS NULL ORDER BY j.id");
        Ok(sqlx::query_as::<_, JobPosting>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fetch_display_fields(&self, ids: &[String]) -> Result<Vec<JobDisplay>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sqlx::query_as::<_, JobDisplay>(
            r#"
            SELECT j.id, j.title, j.location, j.is_remote,
                   c.name AS company_name, c.logo_url AS company_logo,
                   t.name AS type_name,
                   j.created_at, j.updated_at
            FROM jobs j
            LEFT JOIN companies c ON c.id = j.company_id
            LEFT JOIN job_types t ON t.id = j.job_type_id
            WHERE j.id = ANY($1) AND j.deleted_at IS NULL
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }
}
