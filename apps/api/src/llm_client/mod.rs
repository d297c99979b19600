/// LLM client: the single point of entry for all LLM calls in the API.
///
/// ARCHITECTURAL RULE: No other module may call an LLM vendor API directly.
/// All LLM interactions MUST go through this module.
///
/// Models are hardcoded per backend to prevent drift between environments.
use std::str::FromStr;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";
const MAX_TOKENS: u32 = 2048;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Which vendor API backs the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Gemini,
}

impl LlmProvider {
    pub fn model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => OPENAI_MODEL,
            LlmProvider::Gemini => GEMINI_MODEL,
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown LLM provider '{0}'")]
pub struct UnknownProvider(String);

impl FromStr for LlmProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(LlmProvider::OpenAi),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

// OpenAI Chat Completions wire types

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: ErrorBody,
}

// Gemini generateContent wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Backend-neutral completion result.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Returns the generated text, if the backend produced any.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|t| !t.trim().is_empty())
    }
}

impl From<OpenAiResponse> for LlmResponse {
    fn from(r: OpenAiResponse) -> Self {
        let usage = r
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        LlmResponse {
            content: r.choices.into_iter().next().and_then(|c| c.message.content),
            usage,
        }
    }
}

impl From<GeminiResponse> for LlmResponse {
    fn from(r: GeminiResponse) -> Self {
        let usage = r
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();
        // Gemini may split one answer across several text parts
        let content = r
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            });
        LlmResponse { content, usage }
    }
}

/// The single LLM client used by all services.
/// Wraps the configured vendor API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    provider: LlmProvider,
    api_key: String,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            provider,
            api_key,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Makes a plain-text completion call.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        self.send(prompt, system, false).await
    }

    /// Calls the LLM in JSON mode and deserializes the text response.
    /// The prompt must still describe the expected schema.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.send(prompt, system, true).await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    /// Convenience wrapper returning trimmed text or `EmptyContent`.
    pub async fn call_text(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        response
            .text()
            .map(|t| t.trim().to_string())
            .ok_or(LlmError::EmptyContent)
    }

    async fn send(
        &self,
        prompt: &str,
        system: &str,
        json_mode: bool,
    ) -> Result<LlmResponse, LlmError> {
        let body = self.request_body(prompt, system, json_mode);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let request = match self.provider {
                LlmProvider::OpenAi => self
                    .client
                    .post(OPENAI_CHAT_URL)
                    .bearer_auth(&self.api_key),
                LlmProvider::Gemini => self
                    .client
                    .post(format!("{GEMINI_API_BASE}/{GEMINI_MODEL}:generateContent"))
                    .header("x-goog-api-key", &self.api_key),
            };

            let response = match request.json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: self.error_message(body),
                });
            }

            let llm_response: LlmResponse = match self.provider {
                LlmProvider::OpenAi => response.json::<OpenAiResponse>().await?.into(),
                LlmProvider::Gemini => response.json::<GeminiResponse>().await?.into(),
            };

            debug!(
                "LLM call succeeded: provider={:?}, input_tokens={}, output_tokens={}",
                self.provider, llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    fn request_body(&self, prompt: &str, system: &str, json_mode: bool) -> serde_json::Value {
        match self.provider {
            LlmProvider::OpenAi => {
                let mut body = json!({
                    "model": OPENAI_MODEL,
                    "max_tokens": MAX_TOKENS,
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": prompt },
                    ],
                });
                if json_mode {
                    body["response_format"] = json!({ "type": "json_object" });
                }
                body
            }
            LlmProvider::Gemini => {
                let mut generation_config = json!({ "maxOutputTokens": MAX_TOKENS });
                if json_mode {
                    generation_config["responseMimeType"] = json!("application/json");
                }
                json!({
                    "systemInstruction": { "parts": [{ "text": system }] },
                    "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                    "generationConfig": generation_config,
                })
            }
        }
    }

    /// Pulls the vendor error message out of a non-success body, falling back to the raw body.
    fn error_message(&self, body: String) -> String {
        let parsed = match self.provider {
            LlmProvider::OpenAi => serde_json::from_str::<OpenAiError>(&body).map(|e| e.error),
            LlmProvider::Gemini => serde_json::from_str::<GeminiError>(&body).map(|e| e.error),
        };
        parsed.map(|e| e.message).unwrap_or(body)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(provider: LlmProvider) -> LlmClient {
        LlmClient::new(provider, "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_provider_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!(" gemini ".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        let err = "claude".parse::<LlmProvider>().unwrap_err();
        assert_eq!(err.to_string(), "unknown LLM provider 'claude'");
    }

    #[test]
    fn test_openai_response_extracts_first_choice() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "次の質問です"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        let response = LlmResponse::from(parsed);
        assert_eq!(response.text(), Some("次の質問です"));
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[test]
    fn test_gemini_response_joins_text_parts() {
        let raw = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": " 1}"}]}}],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 3}
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        let response = LlmResponse::from(parsed);
        assert_eq!(response.text(), Some("{\"a\": 1}"));
        assert_eq!(response.usage.input_tokens, 8);
    }

    #[test]
    fn test_gemini_blocked_response_has_no_text() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert!(LlmResponse::from(parsed).text().is_none());
    }

    #[test]
    fn test_openai_json_mode_sets_response_format() {
        let body = client(LlmProvider::OpenAi).request_body("p", "s", true);
        assert_eq!(body["model"], OPENAI_MODEL);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "p");
    }

    #[test]
    fn test_gemini_body_carries_system_instruction() {
        let body = client(LlmProvider::Gemini).request_body("p", "s", false);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "s");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "p");
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        let c = client(LlmProvider::OpenAi);
        let msg = c.error_message(r#"{"error": {"message": "invalid key"}}"#.to_string());
        assert_eq!(msg, "invalid key");
        assert_eq!(c.error_message("gateway down".to_string()), "gateway down");
    }
}
