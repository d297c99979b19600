//! ES correction: score, comments and a rewrite that respects the character limit.
//!
//! Flow: validate → quota pre-check → LLM correction (re-asked up to
//! `MAX_SHORTEN_RETRIES` times while the rewrite is over the limit) → persist
//! the result and record usage in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::es::prompts::{
    CORRECTION_PROMPT_TEMPLATE, CORRECTION_ROLE, LIMIT_RULE, NO_LIMIT_RULE, SHORTEN_INSTRUCTION,
};
use crate::llm_client::prompts::{json_system, JAPANESE_OUTPUT_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::models::es::EsCorrectionRow;
use crate::usage::{self, UsageKind};

pub const MAX_CHAR_LIMIT: i32 = 2000;
pub const MAX_ANSWER_CHARS: usize = 5000;
const MAX_SHORTEN_RETRIES: usize = 2;

/// Japanese 文字数: every character except line breaks.
pub fn count_chars(text: &str) -> usize {
    text.chars().filter(|c| *c != '\n' && *c != '\r').count()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionRequest {
    pub user_id: Uuid,
    pub company_name: Option<String>,
    pub question: String,
    pub answer: String,
    pub char_limit: Option<i32>,
}

impl CorrectionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.question.trim().is_empty() {
            return Err(AppError::Validation("question cannot be empty".to_string()));
        }
        if self.answer.trim().is_empty() {
            return Err(AppError::Validation("answer cannot be empty".to_string()));
        }
        if count_chars(&self.answer) > MAX_ANSWER_CHARS {
            return Err(AppError::Validation(format!(
                "answer exceeds {MAX_ANSWER_CHARS} characters"
            )));
        }
        if let Some(limit) = self.char_limit {
            if !(1..=MAX_CHAR_LIMIT).contains(&limit) {
                return Err(AppError::Validation(format!(
                    "char_limit must be between 1 and {MAX_CHAR_LIMIT}"
                )));
            }
        }
        Ok(())
    }

    fn company(&self) -> Option<&str> {
        self.company_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// What the model returns; score may be fractional or out of range.
#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionDraft {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    good_points: Vec<String>,
    #[serde(default)]
    improvement_points: Vec<String>,
    #[serde(default)]
    revised_text: String,
}

/// Produces one correction draft per prompt. `LlmClient` is the production source.
#[async_trait]
pub trait DraftSource: Send + Sync {
    async fn draft(&self, prompt: &str) -> Result<CorrectionDraft, AppError>;
}

#[async_trait]
impl DraftSource for LlmClient {
    async fn draft(&self, prompt: &str) -> Result<CorrectionDraft, AppError> {
        let system = json_system(&format!("{CORRECTION_ROLE} {JAPANESE_OUTPUT_INSTRUCTION}"));
        self.call_json(prompt, &system)
            .await
            .map_err(|e| AppError::Llm(format!("ES correction failed: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub score: u8,
    pub good_points: Vec<String>,
    pub improvement_points: Vec<String>,
    pub revised_text: String,
    pub revised_char_count: usize,
    pub original_char_count: usize,
    /// Still longer than `char_limit` after every retry.
    pub over_limit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: CorrectionResult,
}

fn clamp_score(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    score.round().clamp(0.0, 100.0) as u8
}

fn finalize(draft: CorrectionDraft, original: &str, char_limit: Option<i32>) -> CorrectionResult {
    let clean = |items: Vec<String>| {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    };
    let revised_text = draft.revised_text.trim().to_string();
    let revised_char_count = count_chars(&revised_text);
    CorrectionResult {
        score: clamp_score(draft.score),
        good_points: clean(draft.good_points),
        improvement_points: clean(draft.improvement_points),
        over_limit: exceeds_limit(revised_char_count, char_limit),
        revised_char_count,
        original_char_count: count_chars(original),
        revised_text,
    }
}

fn exceeds_limit(count: usize, char_limit: Option<i32>) -> bool {
    char_limit.is_some_and(|limit| count > limit as usize)
}

pub fn build_correction_prompt(request: &CorrectionRequest) -> String {
    let limit_rule = match request.char_limit {
        Some(limit) => LIMIT_RULE.replace("{char_limit}", &limit.to_string()),
        None => NO_LIMIT_RULE.to_string(),
    };
    CORRECTION_PROMPT_TEMPLATE
        .replace("{company}", request.company().unwrap_or("未指定"))
        .replace("{char_count}", &count_chars(&request.answer).to_string())
        .replace("{limit_rule}", &limit_rule)
        .replace("{question}", request.question.trim())
        .replace("{answer}", request.answer.trim())
}

fn build_shorten_prompt(base: &str, previous: &CorrectionResult, char_limit: i32) -> String {
    let instruction = SHORTEN_INSTRUCTION
        .replace("{previous_count}", &previous.revised_char_count.to_string())
        .replace("{char_limit}", &char_limit.to_string())
        .replace("{previous_text}", &previous.revised_text);
    format!("{base}{instruction}")
}

/// Runs the correction, re-asking while the rewrite is over `char_limit`.
/// After the last retry the result is returned as-is with `over_limit = true`.
pub async fn correct_es(
    source: &dyn DraftSource,
    request: &CorrectionRequest,
) -> Result<CorrectionResult, AppError> {
    let base_prompt = build_correction_prompt(request);
    let mut prompt = base_prompt.clone();
    let mut last: Option<CorrectionResult> = None;

    for attempt in 0..=MAX_SHORTEN_RETRIES {
        let draft = source.draft(&prompt).await?;
        let result = finalize(draft, &request.answer, request.char_limit);

        if result.revised_text.is_empty() {
            return Err(AppError::Llm("ES correction returned no revised text".to_string()));
        }

        let Some(limit) = request.char_limit.filter(|_| result.over_limit) else {
            return Ok(result);
        };

        warn!(
            "ES rewrite attempt {}/{}: {} chars over limit {}",
            attempt + 1,
            MAX_SHORTEN_RETRIES + 1,
            result.revised_char_count,
            limit
        );
        prompt = build_shorten_prompt(&base_prompt, &result, limit);
        last = Some(result);
    }

    last.ok_or_else(|| AppError::Llm("ES correction produced no result".to_string()))
}

/// Validates, corrects and stores one ES answer. Counts against the monthly ES quota.
pub async fn create_correction(
    pool: &PgPool,
    llm: &LlmClient,
    request: &CorrectionRequest,
) -> Result<CorrectionResponse, AppError> {
    request.validate()?;
    let plan = usage::check_quota(pool, request.user_id, UsageKind::EsCorrection).await?;

    let result = correct_es(llm, request).await?;
    let value = serde_json::to_value(&result)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize correction: {e}")))?;

    let mut tx = pool.begin().await?;
    usage::record_usage(&mut *tx, request.user_id, plan, UsageKind::EsCorrection).await?;

    let row = sqlx::query_as::<_, EsCorrectionRow>(
        r#"
        INSERT INTO es_corrections
            (id, user_id, company_name, question, answer, char_limit, score, result)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.user_id)
    .bind(request.company())
    .bind(request.question.trim())
    .bind(request.answer.trim())
    .bind(request.char_limit)
    .bind(result.score as i32)
    .bind(&value)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Stored ES correction {} for user {} (score={}, over_limit={})",
        row.id, request.user_id, result.score, result.over_limit
    );

    Ok(CorrectionResponse {
        id: row.id,
        created_at: row.created_at,
        result,
    })
}

pub async fn list_corrections(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<EsCorrectionRow>, AppError> {
    Ok(sqlx::query_as::<_, EsCorrectionRow>(
        "SELECT * FROM es_corrections WHERE user_id = $1 ORDER BY created_at DESC LIMIT 50",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_correction(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<EsCorrectionRow, AppError> {
    sqlx::query_as::<_, EsCorrectionRow>(
        "SELECT * FROM es_corrections WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("ES correction {id} not found")))
}
