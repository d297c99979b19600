//! Axum route handlers for the ES API.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::es::correction::{
    count_chars, create_correction, get_correction, list_corrections, CorrectionRequest,
    CorrectionResponse,
};
use crate::es::pdf::extract_pdf_text;
use crate::models::es::EsCorrectionRow;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub text: String,
    pub char_count: usize,
}

/// POST /api/v1/es/corrections
pub async fn handle_create_correction(
    State(state): State<AppState>,
    Json(request): Json<CorrectionRequest>,
) -> Result<Json<CorrectionResponse>, AppError> {
    Ok(Json(create_correction(&state.db, &state.llm, &request).await?))
}

/// GET /api/v1/es/corrections?user_id=
pub async fn handle_list_corrections(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<EsCorrectionRow>>, AppError> {
    Ok(Json(list_corrections(&state.db, params.user_id).await?))
}

/// GET /api/v1/es/corrections/:id?user_id=
pub async fn handle_get_correction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<EsCorrectionRow>, AppError> {
    Ok(Json(get_correction(&state.db, id, params.user_id).await?))
}

/// POST /api/v1/es/extract
///
/// Multipart field `file`. Returns the PDF's text so the client can prefill the answer.
pub async fn handle_extract_pdf(mut multipart: Multipart) -> Result<Json<ExtractResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Unreadable file: {e}")))?;
        let text = extract_pdf_text(bytes).await?;
        return Ok(Json(ExtractResponse {
            char_count: count_chars(&text),
            text,
        }));
    }
    Err(AppError::Validation("file is required".to_string()))
}
