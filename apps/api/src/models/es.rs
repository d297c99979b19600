use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EsCorrectionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: Option<String>,
    pub question: String,
    pub answer: String,
    pub char_limit: Option<i32>,
    pub score: i32,
    pub result: Value,
    pub created_at: DateTime<Utc>,
}
