//! Axum route handlers for the Interview API.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::conversation::{
    decode_state, load_interview, load_messages, load_open_interview, process_answer,
    start_interview, AnswerInput, StartInterviewRequest, StartInterviewResponse, TurnResult,
    MAX_ANSWER_CHARS,
};
use crate::interview::feedback::{get_or_generate_feedback, InterviewFeedback};
use crate::interview::workflow::WorkflowState;
use crate::models::interview::{InterviewMessageRow, InterviewRow};
use crate::speech::AudioUpload;
use crate::state::AppState;
use crate::storage::{answer_audio_key, put_audio};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TextAnswerRequest {
    pub user_id: Uuid,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct InterviewDetailResponse {
    pub interview: InterviewRow,
    pub messages: Vec<InterviewMessageRow>,
    pub state: WorkflowState,
    pub progress: f64,
    /// Questions asked so far in the current phase.
    pub phase_question_count: u32,
}

impl InterviewDetailResponse {
    fn new(
        interview: InterviewRow,
        messages: Vec<InterviewMessageRow>,
        state: WorkflowState,
    ) -> Self {
        Self {
            progress: state.progress(),
            phase_question_count: state.question_count(&state.current_phase_id),
            interview,
            messages,
            state,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/interviews
///
/// Opens a session and returns the first question. Counts against the monthly quota.
pub async fn handle_start_interview(
    State(state): State<AppState>,
    Json(request): Json<StartInterviewRequest>,
) -> Result<Json<StartInterviewResponse>, AppError> {
    Ok(Json(start_interview(&state.db, &request).await?))
}

/// GET /api/v1/interviews?user_id=
pub async fn handle_list_interviews(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<InterviewRow>>, AppError> {
    let rows = sqlx::query_as::<_, InterviewRow>(
        "SELECT * FROM interviews WHERE user_id = $1 ORDER BY created_at DESC LIMIT 50",
    )
    .bind(params.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// GET /api/v1/interviews/:id?user_id=
pub async fn handle_get_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<InterviewDetailResponse>, AppError> {
    let interview = load_interview(&state.db, interview_id, params.user_id).await?;
    let workflow = decode_state(&interview)?;
    let messages = load_messages(&state.db, interview_id).await?;

    Ok(Json(InterviewDetailResponse::new(interview, messages, workflow)))
}

/// POST /api/v1/interviews/:id/answers
///
/// Typed answer. Runs one full turn and returns the next question.
pub async fn handle_text_answer(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    Json(request): Json<TextAnswerRequest>,
) -> Result<Json<TurnResult>, AppError> {
    let result = process_answer(
        &state.db,
        state.interviewer.as_ref(),
        interview_id,
        AnswerInput {
            user_id: request.user_id,
            text: &request.answer,
            audio_key: None,
        },
    )
    .await?;
    Ok(Json(result))
}

/// POST /api/v1/interviews/:id/audio
///
/// Multipart fields: `user_id` (text) and `audio` (file).
/// The recording is transcribed, archived to S3, then handled like a typed answer.
pub async fn handle_audio_answer(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<TurnResult>, AppError> {
    let (user_id, audio) = read_audio_form(multipart).await?;
    audio.validate()?;

    // Fail fast before paying for transcription.
    let row = load_open_interview(&state.db, interview_id, user_id).await?;

    let transcript = state.speech.transcribe(&audio).await?;
    check_transcript(&transcript)?;

    let extension = audio.extension().unwrap_or("bin");
    let key = answer_audio_key(interview_id, row.turn_count + 1, Uuid::new_v4(), extension);
    put_audio(
        &state.s3,
        &state.config.s3_bucket,
        &key,
        audio.bytes.clone(),
        &audio.content_type,
    )
    .await?;

    info!(
        "Transcribed {} bytes of audio for interview {}",
        audio.bytes.len(),
        interview_id
    );

    let result = process_answer(
        &state.db,
        state.interviewer.as_ref(),
        interview_id,
        AnswerInput {
            user_id,
            text: &transcript,
            audio_key: Some(key),
        },
    )
    .await?;
    Ok(Json(result))
}

/// POST /api/v1/interviews/:id/feedback
///
/// Generated once on first request after the interview completes, then served from the row.
pub async fn handle_feedback(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    Json(request): Json<UserIdQuery>,
) -> Result<Json<InterviewFeedback>, AppError> {
    let feedback =
        get_or_generate_feedback(&state.db, &state.llm, interview_id, request.user_id).await?;
    Ok(Json(feedback))
}

/// A recording that yields no usable answer is 422, whether silent or too long.
fn check_transcript(transcript: &str) -> Result<(), AppError> {
    let chars = transcript.trim().chars().count();
    if chars == 0 {
        return Err(AppError::UnprocessableEntity(
            "No speech was recognized in the recording".to_string(),
        ));
    }
    if chars > MAX_ANSWER_CHARS {
        return Err(AppError::UnprocessableEntity(format!(
            "The transcribed answer exceeds {MAX_ANSWER_CHARS} characters"
        )));
    }
    Ok(())
}

async fn read_audio_form(mut multipart: Multipart) -> Result<(Uuid, AudioUpload), AppError> {
    let mut user_id: Option<Uuid> = None;
    let mut audio: Option<AudioUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("user_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable user_id: {e}")))?;
                let parsed = Uuid::parse_str(text.trim())
                    .map_err(|_| AppError::Validation("user_id must be a UUID".to_string()))?;
                user_id = Some(parsed);
            }
            Some("audio") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable audio: {e}")))?;
                audio = Some(AudioUpload {
                    bytes,
                    content_type,
                });
            }
            _ => {}
        }
    }

    let user_id = user_id.ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;
    let audio = audio.ok_or_else(|| AppError::Validation("audio is required".to_string()))?;
    Ok((user_id, audio))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::interview::workflow::FieldAssessment;

    #[test]
    fn test_empty_transcript_is_unprocessable() {
        assert!(matches!(
            check_transcript("  \n "),
            Err(AppError::UnprocessableEntity(_))
        ));
    }

    #[test]
    fn test_overlong_transcript_is_unprocessable() {
        let long = "あ".repeat(MAX_ANSWER_CHARS + 1);
        assert!(matches!(
            check_transcript(&long),
            Err(AppError::UnprocessableEntity(_))
        ));
        assert!(check_transcript(&"あ".repeat(MAX_ANSWER_CHARS)).is_ok());
    }

    #[test]
    fn test_detail_reports_questions_in_current_phase() {
        let mut state = WorkflowState::new();
        state.apply_answer(&FieldAssessment::default()).unwrap();
        let interview = InterviewRow {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            company_name: None,
            industry: "general".to_string(),
            status: "in_progress".to_string(),
            workflow_state: json!({}),
            turn_count: 1,
            feedback: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let detail = InterviewDetailResponse::new(interview, Vec::new(), state);
        assert_eq!(detail.phase_question_count, 1);
        assert_eq!(detail.progress, 0.0);
    }
}
