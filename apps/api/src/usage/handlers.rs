use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::usage::{get_usage_summary, UsageSummary};

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// GET /api/v1/usage
pub async fn handle_get_usage(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<UsageSummary>, AppError> {
    Ok(Json(get_usage_summary(&state.db, params.user_id).await?))
}
