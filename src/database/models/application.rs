use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Pipeline stages, declared in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "application_stage", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStage {
    Identified,
    ResumeUpdated,
    ColdMessageSent,
    ConnectionAccepted,
    Applied,
    InterviewScheduled,
    Offer,
    Rejected,
    Closed,
}

impl ApplicationStage {
    pub const PIPELINE: [ApplicationStage; 9] = [
        ApplicationStage::Identified,
        ApplicationStage::ResumeUpdated,
        ApplicationStage::ColdMessageSent,
        ApplicationStage::ConnectionAccepted,
        ApplicationStage::Applied,
        ApplicationStage::InterviewScheduled,
        ApplicationStage::Offer,
        ApplicationStage::Rejected,
        ApplicationStage::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStage::Identified => "IDENTIFIED",
            ApplicationStage::ResumeUpdated => "RESUME_UPDATED",
            ApplicationStage::ColdMessageSent => "COLD_MESSAGE_SENT",
            ApplicationStage::ConnectionAccepted => "CONNECTION_ACCEPTED",
            ApplicationStage::Applied => "APPLIED",
            ApplicationStage::InterviewScheduled => "INTERVIEW_SCHEDULED",
            ApplicationStage::Offer => "OFFER",
            ApplicationStage::Rejected => "REJECTED",
            ApplicationStage::Closed => "CLOSED",
        }
    }
}

/// Reminder already sent for the current followUpDate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Upcoming,
    Overdue,
}

impl ReminderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderState::Upcoming => "UPCOMING",
            ReminderState::Overdue => "OVERDUE",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub client_id: Uuid,
    pub recruiter_id: Uuid,
    pub stage: ApplicationStage,
    pub notes: Option<String>,
    pub follow_up_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reminder_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const APPLICATION_COLUMNS: &str = "id, job_id, client_id, recruiter_id, stage, notes, \
     follow_up_date, reminder_state, created_at, updated_at";
