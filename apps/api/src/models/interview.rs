use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: Option<String>,
    pub industry: String,
    pub status: String,
    pub workflow_state: Value,
    pub turn_count: i32,
    pub feedback: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewMessageRow {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub seq: i32,
    pub role: String,
    pub phase_id: String,
    pub content: String,
    pub audio_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

/// Speaker of an interview message, stored in `interview_messages.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Interviewer,
    Candidate,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Interviewer => "interviewer",
            MessageRole::Candidate => "candidate",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::Interviewer => "面接官",
            MessageRole::Candidate => "候補者",
        }
    }
}

impl InterviewMessageRow {
    pub fn speaker(&self) -> MessageRole {
        if self.role == MessageRole::Candidate.as_str() {
            MessageRole::Candidate
        } else {
            MessageRole::Interviewer
        }
    }
}
