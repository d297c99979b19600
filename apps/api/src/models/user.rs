use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPlanRow {
    pub user_id: Uuid,
    pub plan: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageCounterRow {
    pub user_id: Uuid,
    pub period: String,
    pub interviews: i32,
    pub es_corrections: i32,
    pub updated_at: DateTime<Utc>,
}
