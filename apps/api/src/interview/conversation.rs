//! Interview conversation: one candidate answer in, one interviewer line out.
//!
//! Flow per turn: load interview → assess answer fields (LLM) → advance workflow
//! → phrase next question (LLM, or the fixed closing line) → persist messages
//! and state in one transaction.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::interviewer::{Interviewer, QuestionRequest};
use crate::interview::phases::{find_phase, first_phase, Industry};
use crate::interview::prompts::CLOSING_MESSAGE;
use crate::interview::workflow::{TurnOutcome, WorkflowError, WorkflowState};
use crate::models::interview::{
    InterviewMessageRow, InterviewRow, MessageRole, STATUS_COMPLETED, STATUS_IN_PROGRESS,
};
use crate::usage::{self, UsageKind};

/// Hard ceiling on a single typed or transcribed answer.
pub const MAX_ANSWER_CHARS: usize = 2000;

/// Request body for starting an interview.
#[derive(Debug, Clone, Deserialize)]
pub struct StartInterviewRequest {
    pub user_id: Uuid,
    pub company_name: Option<String>,
    #[serde(default)]
    pub industry: Industry,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartInterviewResponse {
    pub interview_id: Uuid,
    pub phase_id: String,
    pub phase_title: String,
    pub question: String,
}

/// What the client gets back after each answer.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub interview_id: Uuid,
    pub transcript: String,
    pub outcome: TurnOutcome,
    pub next_question: String,
    pub phase_id: String,
    pub phase_title: String,
    pub progress: f64,
    pub finished: bool,
}

/// The in-memory part of a turn, before anything is written.
#[derive(Debug, Clone)]
pub struct PlannedTurn {
    pub state: WorkflowState,
    pub outcome: TurnOutcome,
    pub next_question: String,
}

/// Optional audio reference attached to the candidate message.
pub struct AnswerInput<'a> {
    pub user_id: Uuid,
    pub text: &'a str,
    pub audio_key: Option<String>,
}

pub fn validate_answer(text: &str) -> Result<(), AppError> {
    let chars = text.trim().chars().count();
    if chars == 0 {
        return Err(AppError::Validation("answer cannot be empty".to_string()));
    }
    if chars > MAX_ANSWER_CHARS {
        return Err(AppError::Validation(format!(
            "answer exceeds {MAX_ANSWER_CHARS} characters"
        )));
    }
    Ok(())
}

/// Parses the JSONB workflow column.
pub fn decode_state(row: &InterviewRow) -> Result<WorkflowState, AppError> {
    serde_json::from_value(row.workflow_state.clone()).map_err(|e| {
        AppError::Internal(anyhow::anyhow!(
            "Corrupt workflow state on interview {}: {e}",
            row.id
        ))
    })
}

/// Creates the interview row with a fresh workflow and records the opening question.
/// The monthly interview quota is taken in the same transaction.
pub async fn start_interview(
    pool: &PgPool,
    request: &StartInterviewRequest,
) -> Result<StartInterviewResponse, AppError> {
    let plan = usage::check_quota(pool, request.user_id, UsageKind::Interview).await?;
    let interview_id = Uuid::new_v4();
    let state = WorkflowState::new();
    let phase = first_phase();
    let state_value = serde_json::to_value(&state)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize state: {e}")))?;
    let company_name = request
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut tx = pool.begin().await?;

    usage::record_usage(&mut *tx, request.user_id, plan, UsageKind::Interview).await?;

    sqlx::query(
        r#"
        INSERT INTO interviews (id, user_id, company_name, industry, status, workflow_state)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(interview_id)
    .bind(request.user_id)
    .bind(company_name)
    .bind(request.industry.as_str())
    .bind(STATUS_IN_PROGRESS)
    .bind(&state_value)
    .execute(&mut *tx)
    .await?;

    insert_message(
        &mut tx,
        interview_id,
        0,
        MessageRole::Interviewer,
        phase.id,
        phase.opening_question,
        None,
    )
    .await?;

    tx.commit().await?;

    info!(
        "Started interview {} for user {} (industry={})",
        interview_id,
        request.user_id,
        request.industry.as_str()
    );

    Ok(StartInterviewResponse {
        interview_id,
        phase_id: phase.id.to_string(),
        phase_title: phase.title.to_string(),
        question: phase.opening_question.to_string(),
    })
}

/// Loads an interview owned by `user_id` that can still take answers.
pub async fn load_open_interview(
    pool: &PgPool,
    interview_id: Uuid,
    user_id: Uuid,
) -> Result<InterviewRow, AppError> {
    let row = load_interview(pool, interview_id, user_id).await?;
    if row.status == STATUS_COMPLETED {
        return Err(WorkflowError::AlreadyFinished.into());
    }
    Ok(row)
}

pub async fn load_interview(
    pool: &PgPool,
    interview_id: Uuid,
    user_id: Uuid,
) -> Result<InterviewRow, AppError> {
    sqlx::query_as::<_, InterviewRow>("SELECT * FROM interviews WHERE id = $1 AND user_id = $2")
        .bind(interview_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview {interview_id} not found")))
}

pub async fn load_messages(
    pool: &PgPool,
    interview_id: Uuid,
) -> Result<Vec<InterviewMessageRow>, AppError> {
    Ok(sqlx::query_as::<_, InterviewMessageRow>(
        "SELECT * FROM interview_messages WHERE interview_id = $1 ORDER BY seq ASC",
    )
    .bind(interview_id)
    .fetch_all(pool)
    .await?)
}

/// Applies one answer to a copy of the workflow state and phrases the reply.
/// Nothing is persisted; callers commit `PlannedTurn::state` themselves.
pub async fn plan_turn(
    interviewer: &dyn Interviewer,
    state: &WorkflowState,
    industry: Industry,
    company_name: Option<&str>,
    history: &[InterviewMessageRow],
    answer: &str,
) -> Result<PlannedTurn, AppError> {
    if state.finished {
        return Err(WorkflowError::AlreadyFinished.into());
    }
    let mut state = state.clone();
    let phase = state.current_phase()?;

    let last_question = history
        .iter()
        .rev()
        .find(|m| m.speaker() == MessageRole::Interviewer)
        .map(|m| m.content.as_str())
        .unwrap_or(phase.opening_question);

    let assessment = interviewer
        .assess_answer(phase, last_question, answer)
        .await?;
    let outcome = state.apply_answer(&assessment)?;

    // The question writer reacts to this answer, so it must end the history.
    let mut turn_history = history.to_vec();
    turn_history.push(InterviewMessageRow {
        id: Uuid::new_v4(),
        interview_id: history.first().map(|m| m.interview_id).unwrap_or_default(),
        seq: history.last().map(|m| m.seq + 1).unwrap_or(0),
        role: MessageRole::Candidate.as_str().to_string(),
        phase_id: phase.id.to_string(),
        content: answer.to_string(),
        audio_key: None,
        created_at: Utc::now(),
    });

    let next_question = match &outcome {
        TurnOutcome::Finished { .. } => CLOSING_MESSAGE.to_string(),
        TurnOutcome::FollowUp { missing_keys, .. } => {
            interviewer
                .next_question(&QuestionRequest {
                    phase,
                    industry,
                    company_name,
                    missing_keys,
                    history: &turn_history,
                })
                .await?
        }
        TurnOutcome::Advanced { to, .. } => {
            let next = find_phase(to).ok_or_else(|| WorkflowError::UnknownPhase(to.clone()))?;
            interviewer
                .next_question(&QuestionRequest {
                    phase: next,
                    industry,
                    company_name,
                    missing_keys: &[],
                    history: &turn_history,
                })
                .await?
        }
    };

    Ok(PlannedTurn {
        state,
        outcome,
        next_question,
    })
}

/// Runs one full turn for `interview_id` and persists it.
pub async fn process_answer(
    pool: &PgPool,
    interviewer: &dyn Interviewer,
    interview_id: Uuid,
    input: AnswerInput<'_>,
) -> Result<TurnResult, AppError> {
    validate_answer(input.text)?;
    let answer = input.text.trim();

    let row = load_open_interview(pool, interview_id, input.user_id).await?;
    let state = decode_state(&row)?;
    let history = load_messages(pool, interview_id).await?;
    let answered_phase = state.current_phase_id.clone();

    let planned = plan_turn(
        interviewer,
        &state,
        Industry::from_db(&row.industry),
        row.company_name.as_deref(),
        &history,
        answer,
    )
    .await?;

    let state_value = serde_json::to_value(&planned.state)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize state: {e}")))?;
    let status = if planned.state.finished {
        STATUS_COMPLETED
    } else {
        STATUS_IN_PROGRESS
    };
    let next_seq = history.last().map(|m| m.seq + 1).unwrap_or(0);

    let mut tx = pool.begin().await?;

    // Optimistic check: a concurrent answer for the same turn loses here.
    let updated = sqlx::query(
        r#"
        UPDATE interviews
        SET workflow_state = $1, status = $2, turn_count = turn_count + 1, updated_at = now()
        WHERE id = $3 AND turn_count = $4
        "#,
    )
    .bind(&state_value)
    .bind(status)
    .bind(interview_id)
    .bind(row.turn_count)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        warn!(
            "Interview {interview_id} turn {} was answered concurrently",
            row.turn_count
        );
        return Err(AppError::Conflict(
            "This question has already been answered".to_string(),
        ));
    }

    insert_message(
        &mut tx,
        interview_id,
        next_seq,
        MessageRole::Candidate,
        &answered_phase,
        answer,
        input.audio_key.as_deref(),
    )
    .await?;

    let current_phase = planned.state.current_phase()?;
    insert_message(
        &mut tx,
        interview_id,
        next_seq + 1,
        MessageRole::Interviewer,
        current_phase.id,
        &planned.next_question,
        None,
    )
    .await?;

    tx.commit().await?;

    info!(
        "Interview {} turn {}: {:?}",
        interview_id,
        row.turn_count + 1,
        planned.outcome
    );

    Ok(TurnResult {
        interview_id,
        transcript: answer.to_string(),
        progress: planned.state.progress(),
        finished: planned.state.finished,
        phase_id: current_phase.id.to_string(),
        phase_title: current_phase.title.to_string(),
        outcome: planned.outcome,
        next_question: planned.next_question,
    })
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    interview_id: Uuid,
    seq: i32,
    role: MessageRole,
    phase_id: &str,
    content: &str,
    audio_key: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO interview_messages (id, interview_id, seq, role, phase_id, content, audio_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(interview_id)
    .bind(seq)
    .bind(role.as_str())
    .bind(phase_id)
    .bind(content)
    .bind(audio_key)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
