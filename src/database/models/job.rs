use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_source", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobSource {
    Linkedin,
    Indeed,
    Naukri,
    Other,
}

impl JobSource {
    pub const ALL: [JobSource; 4] = [
        JobSource::Linkedin,
        JobSource::Indeed,
        JobSource::Naukri,
        JobSource::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobSource::Linkedin => "LINKEDIN",
            JobSource::Indeed => "INDEED",
            JobSource::Naukri => "NAUKRI",
            JobSource::Other => "OTHER",
        }
    }
}

impl FromStr for JobSource {
    type Err = String;

    /// Case-insensitive; the extension posts lower-case sources.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LINKEDIN" => Ok(JobSource::Linkedin),
            "INDEED" => Ok(JobSource::Indeed),
            "NAUKRI" => Ok(JobSource::Naukri),
            "OTHER" => Ok(JobSource::Other),
            other => Err(format!("Invalid job source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub source: JobSource,
    pub job_url: Option<String>,
    pub recruiter_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const JOB_COLUMNS: &str =
    "id, title, company, location, description, source, job_url, recruiter_id, created_at, updated_at";
