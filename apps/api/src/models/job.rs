use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A job posting as the matching core sees it: the embeddable text fields plus the
/// display metadata copied into the vector payload.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub responsibilities: Option<String>,
    pub location: Option<String>,
    pub is_remote: bool,
    pub company_name: Option<String>,
    pub company_logo: Option<String>,
    pub type_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fresh display fields used to hydrate search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobDisplay {
    pub id: String,
    pub title: String,
    pub location: Option<String>,
    pub is_remote: bool,
    pub company_name: Option<String>,
    pub company_logo: Option<String>,
    pub type_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload stored next to every job vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub title: String,
    pub location: Option<String>,
    pub remote: bool,
    pub company_name: Option<String>,
    pub company_logo: Option<String>,
    pub type_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&JobPosting> for JobPayload {
    fn from(job: &JobPosting) -> Self {
        Self {
            title: job.title.clone(),
            location: job.location.clone(),
            remote: job.is_remote,
            company_name: job.company_name.clone(),
            company_logo: job.company_logo.clone(),
            type_name: job.type_name.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
