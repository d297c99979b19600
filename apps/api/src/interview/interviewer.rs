//! Pluggable, trait-based LLM seam for the interview dialogue.
//!
//! Default: `LlmInterviewer`, which goes through `llm_client`.
//! `AppState` holds an `Arc<dyn Interviewer>` so the turn logic can be
//! exercised without a vendor API.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::interview::phases::{describe_key, render_phase_prompt, Industry, PhaseConfig};
use crate::interview::prompts::{
    ASSESS_PROMPT_TEMPLATE, ASSESS_ROLE, FOLLOW_UP_INSTRUCTION, NEW_PHASE_INSTRUCTION,
    QUESTION_PROMPT_TEMPLATE, QUESTION_SYSTEM,
};
use crate::interview::workflow::FieldAssessment;
use crate::llm_client::prompts::{bullet_list, json_system};
use crate::llm_client::LlmClient;
use crate::models::interview::InterviewMessageRow;

/// How many trailing messages are shown to the question writer.
const HISTORY_WINDOW: usize = 8;

/// Everything needed to phrase the interviewer's next line.
pub struct QuestionRequest<'a> {
    pub phase: &'static PhaseConfig,
    pub industry: Industry,
    pub company_name: Option<&'a str>,
    /// Empty when the phase has just opened.
    pub missing_keys: &'a [String],
    pub history: &'a [InterviewMessageRow],
}

impl QuestionRequest<'_> {
    pub fn is_follow_up(&self) -> bool {
        !self.missing_keys.is_empty()
    }
}

#[async_trait]
pub trait Interviewer: Send + Sync {
    /// Extracts the phase's expected fields from one answer.
    async fn assess_answer(
        &self,
        phase: &PhaseConfig,
        question: &str,
        answer: &str,
    ) -> Result<FieldAssessment, AppError>;

    /// Phrases the next interviewer utterance.
    async fn next_question(&self, request: &QuestionRequest<'_>) -> Result<String, AppError>;
}

pub struct LlmInterviewer {
    llm: LlmClient,
}

impl LlmInterviewer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Interviewer for LlmInterviewer {
    async fn assess_answer(
        &self,
        phase: &PhaseConfig,
        question: &str,
        answer: &str,
    ) -> Result<FieldAssessment, AppError> {
        let prompt = build_assess_prompt(phase, question, answer);
        self.llm
            .call_json::<FieldAssessment>(&prompt, &json_system(ASSESS_ROLE))
            .await
            .map_err(|e| AppError::Llm(format!("Answer assessment failed: {e}")))
    }

    async fn next_question(&self, request: &QuestionRequest<'_>) -> Result<String, AppError> {
        let prompt = build_question_prompt(request);
        let text = self
            .llm
            .call_text(&prompt, QUESTION_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Question generation failed: {e}")))?;
        Ok(clean_utterance(&text))
    }
}

/// Fills the extraction template with the phase's keys and a null-valued schema.
pub fn build_assess_prompt(phase: &PhaseConfig, question: &str, answer: &str) -> String {
    let fields = phase
        .expected_data
        .iter()
        .map(|k| format!("{k}: {}", describe_key(k)))
        .collect::<Vec<_>>();

    let schema_fields: Map<String, Value> = phase
        .expected_data
        .iter()
        .map(|k| (k.to_string(), Value::String("string | null".to_string())))
        .collect();
    let schema = serde_json::to_string_pretty(&serde_json::json!({ "fields": schema_fields }))
        .unwrap_or_default();

    ASSESS_PROMPT_TEMPLATE
        .replace("{phase_title}", phase.title)
        .replace("{question}", question)
        .replace("{fields}", &bullet_list(&fields))
        .replace("{schema}", &schema)
        .replace("{answer}", answer)
}

pub fn build_question_prompt(request: &QuestionRequest<'_>) -> String {
    let instruction = if request.is_follow_up() {
        let missing = request
            .missing_keys
            .iter()
            .map(|k| describe_key(k))
            .collect::<Vec<_>>();
        FOLLOW_UP_INSTRUCTION.replace("{missing}", &bullet_list(&missing))
    } else {
        NEW_PHASE_INSTRUCTION.replace("{opening_question}", request.phase.opening_question)
    };

    QUESTION_PROMPT_TEMPLATE
        .replace("{company}", request.company_name.unwrap_or("未指定"))
        .replace("{industry}", request.industry.label())
        .replace("{phase_title}", request.phase.title)
        .replace(
            "{phase_prompt}",
            &render_phase_prompt(request.phase, request.industry),
        )
        .replace("{instruction}", &instruction)
        .replace("{history}", &render_history(request.history, HISTORY_WINDOW))
}

/// Renders the last `window` messages as `話者: 内容` lines.
pub fn render_history(history: &[InterviewMessageRow], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    let lines = history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.speaker().label(), m.content.trim()))
        .collect::<Vec<_>>();
    if lines.is_empty() {
        "(まだ会話はありません)".to_string()
    } else {
        lines.join("\n")
    }
}

/// Strips quotes and speaker labels the model sometimes adds.
pub fn clean_utterance(text: &str) -> String {
    let text = text.trim();
    let text = text
        .strip_prefix("面接官:")
        .or_else(|| text.strip_prefix("面接官："))
        .unwrap_or(text)
        .trim();
    text.trim_matches(|c| c == '「' || c == '」' || c == '"')
        .trim()
        .to_string()
}
