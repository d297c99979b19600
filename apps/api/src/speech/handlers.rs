use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::speech::SynthesizedSpeech;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub voice: Option<String>,
}

/// POST /api/v1/tts
///
/// Voices an interviewer line. Repeated phrases are served from the Redis cache.
pub async fn handle_tts(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Json<SynthesizedSpeech>, AppError> {
    let speech = state
        .speech
        .synthesize(&request.text, request.voice.as_deref())
        .await?;
    Ok(Json(speech))
}
