//! Speech services: answer transcription (OpenAI Whisper) and question
//! voicing (Google Cloud Text-to-Speech).
//!
//! Like `llm_client`, this is the only module allowed to talk to the
//! speech vendors.

use reqwest::Client;
use thiserror::Error;

pub mod handlers;
pub mod transcribe;
pub mod tts;

pub use transcribe::AudioUpload;
pub use tts::SynthesizedSpeech;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Speech API returned no content")]
    EmptyContent,
}

/// Client for both speech vendors. Cheap to clone.
#[derive(Clone)]
pub struct SpeechClient {
    client: Client,
    openai_api_key: String,
    tts_api_key: String,
    redis: redis::Client,
}

impl SpeechClient {
    pub fn new(
        openai_api_key: String,
        tts_api_key: String,
        redis: redis::Client,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()?,
            openai_api_key,
            tts_api_key,
            redis,
        })
    }
}

/// Backoff before retry `attempt` (1-based): 1s, 2s.
fn backoff(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_millis(1000 * (1 << (attempt - 1)))
}

/// Whether a vendor status code is worth retrying.
fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1).as_millis(), 1000);
        assert_eq!(backoff(2).as_millis(), 2000);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(reqwest::StatusCode::BAD_REQUEST));
    }
}
