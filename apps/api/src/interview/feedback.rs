//! Post-interview evaluation of a finished mock interview.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::conversation::{decode_state, load_interview, load_messages};
use crate::interview::phases::{find_phase, Industry};
use crate::interview::prompts::{FEEDBACK_PROMPT_TEMPLATE, FEEDBACK_ROLE};
use crate::interview::workflow::WorkflowState;
use crate::llm_client::prompts::{bullet_list, json_system, JAPANESE_OUTPUT_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::models::interview::{InterviewMessageRow, InterviewRow, STATUS_COMPLETED};

/// Category scores as the model returns them; may be fractional or out of range.
#[derive(Debug, Clone, Deserialize)]
struct RawScores {
    #[serde(default)]
    logic: f64,
    #[serde(default)]
    specificity: f64,
    #[serde(default)]
    enthusiasm: f64,
    #[serde(default)]
    communication: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct FeedbackDraft {
    scores: RawScores,
    #[serde(default)]
    good_points: Vec<String>,
    #[serde(default)]
    improvement_points: Vec<String>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub logic: u8,
    pub specificity: u8,
    pub enthusiasm: u8,
    pub communication: u8,
}

impl CategoryScores {
    /// Rounded mean of the four categories.
    pub fn overall(&self) -> u8 {
        let sum = self.logic as u32
            + self.specificity as u32
            + self.enthusiasm as u32
            + self.communication as u32;
        ((sum as f64) / 4.0).round() as u8
    }
}

/// Stored in `interviews.feedback` and returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewFeedback {
    pub overall_score: u8,
    pub scores: CategoryScores,
    pub good_points: Vec<String>,
    pub improvement_points: Vec<String>,
    pub summary: String,
    /// Titles of phases that hit the question cap.
    pub weak_phases: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

fn clamp_score(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    score.round().clamp(0.0, 100.0) as u8
}

fn normalize(draft: FeedbackDraft, state: &WorkflowState) -> InterviewFeedback {
    let scores = CategoryScores {
        logic: clamp_score(draft.scores.logic),
        specificity: clamp_score(draft.scores.specificity),
        enthusiasm: clamp_score(draft.scores.enthusiasm),
        communication: clamp_score(draft.scores.communication),
    };
    let clean = |items: Vec<String>| {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    };
    InterviewFeedback {
        overall_score: scores.overall(),
        scores,
        good_points: clean(draft.good_points),
        improvement_points: clean(draft.improvement_points),
        summary: draft.summary.trim().to_string(),
        weak_phases: weak_phase_titles(state),
        generated_at: Utc::now(),
    }
}

fn weak_phase_titles(state: &WorkflowState) -> Vec<String> {
    state
        .failed_phases
        .iter()
        .map(|id| find_phase(id).map(|p| p.title).unwrap_or(id.as_str()).to_string())
        .collect()
}

/// Renders the whole session as `話者: 内容` lines.
pub fn render_transcript(messages: &[InterviewMessageRow]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.speaker().label(), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_feedback_prompt(
    row: &InterviewRow,
    messages: &[InterviewMessageRow],
    state: &WorkflowState,
) -> String {
    let collected = state
        .collected_values()
        .into_iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>();

    FEEDBACK_PROMPT_TEMPLATE
        .replace("{company}", row.company_name.as_deref().unwrap_or("未指定"))
        .replace("{industry}", Industry::from_db(&row.industry).label())
        .replace("{weak_phases}", &bullet_list(&weak_phase_titles(state)))
        .replace("{collected}", &bullet_list(&collected))
        .replace("{transcript}", &render_transcript(messages))
}

/// Returns stored feedback, generating and storing it on first request.
pub async fn get_or_generate_feedback(
    pool: &PgPool,
    llm: &LlmClient,
    interview_id: Uuid,
    user_id: Uuid,
) -> Result<InterviewFeedback, AppError> {
    let row = load_interview(pool, interview_id, user_id).await?;

    if let Some(stored) = &row.feedback {
        if let Ok(feedback) = serde_json::from_value::<InterviewFeedback>(stored.clone()) {
            return Ok(feedback);
        }
    }

    if row.status != STATUS_COMPLETED {
        return Err(AppError::Conflict(
            "Feedback is available once the interview has finished".to_string(),
        ));
    }

    let state = decode_state(&row)?;
    let messages = load_messages(pool, interview_id).await?;
    let prompt = build_feedback_prompt(&row, &messages, &state);

    let system = json_system(&format!("{FEEDBACK_ROLE} {JAPANESE_OUTPUT_INSTRUCTION}"));
    let draft: FeedbackDraft = llm
        .call_json(&prompt, &system)
        .await
        .map_err(|e| AppError::Llm(format!("Feedback generation failed: {e}")))?;
    let feedback = normalize(draft, &state);

    let value = serde_json::to_value(&feedback)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize feedback: {e}")))?;
    sqlx::query("UPDATE interviews SET feedback = $1, updated_at = now() WHERE id = $2")
        .bind(&value)
        .bind(interview_id)
        .execute(pool)
        .await?;

    info!(
        "Generated feedback for interview {}: overall {}",
        interview_id, feedback.overall_score
    );
    Ok(feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::workflow::FieldAssessment;

    fn draft(json: serde_json::Value) -> FeedbackDraft {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_scores_are_clamped_and_averaged() {
        let feedback = normalize(
            draft(serde_json::json!({
                "scores": {"logic": 120, "specificity": -5, "enthusiasm": 80, "communication": 70},
                "good_points": ["結論から話せていました", "  "],
                "improvement_points": [],
                "summary": " 全体として良好です。 "
            })),
            &WorkflowState::new(),
        );
        assert_eq!(feedback.scores.logic, 100);
        assert_eq!(feedback.scores.specificity, 0);
        // (100 + 0 + 80 + 70) / 4 = 62.5 -> 63
        assert_eq!(feedback.overall_score, 63);
        assert_eq!(feedback.good_points, vec!["結論から話せていました".to_string()]);
        assert_eq!(feedback.summary, "全体として良好です。");
    }

    #[test]
    fn test_missing_score_fields_default_to_zero() {
        let feedback = normalize(
            draft(serde_json::json!({"scores": {"logic": 50}})),
            &WorkflowState::new(),
        );
        assert_eq!(feedback.scores.enthusiasm, 0);
        assert_eq!(feedback.overall_score, 13);
    }

    #[test]
    fn test_weak_phases_use_titles() {
        let mut state = WorkflowState::new();
        for _ in 0..3 {
            state.apply_answer(&FieldAssessment::default()).unwrap();
        }
        let feedback = normalize(draft(serde_json::json!({"scores": {}})), &state);
        assert_eq!(feedback.weak_phases, vec!["自己紹介".to_string()]);
    }

    #[test]
    fn test_stored_feedback_round_trips() {
        let feedback = normalize(
            draft(serde_json::json!({
                "scores": {"logic": 70, "specificity": 70, "enthusiasm": 70, "communication": 70}
            })),
            &WorkflowState::new(),
        );
        let value = serde_json::to_value(&feedback).unwrap();
        let restored: InterviewFeedback = serde_json::from_value(value).unwrap();
        assert_eq!(restored.overall_score, 70);
        assert_eq!(restored.scores, feedback.scores);
    }
}
