use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{backoff, is_retryable, SpeechClient, SpeechError, MAX_RETRIES};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const WHISPER_MODEL: &str = "whisper-1";
/// Upload ceiling enforced by the transcription endpoint.
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// Content types the recorder in the browser may produce, with the file
/// extension Whisper uses to sniff the container.
const SUPPORTED_AUDIO: &[(&str, &str)] = &[
    ("audio/webm", "webm"),
    ("audio/ogg", "ogg"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/m4a", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
];

/// One recorded answer as received from the client.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

impl AudioUpload {
    /// Validates size and container type.
    pub fn validate(&self) -> Result<(), SpeechError> {
        if self.bytes.is_empty() {
            return Err(SpeechError::InvalidInput("audio is empty".to_string()));
        }
        if self.bytes.len() > MAX_AUDIO_BYTES {
            return Err(SpeechError::InvalidInput(format!(
                "audio exceeds {} MB",
                MAX_AUDIO_BYTES / 1024 / 1024
            )));
        }
        if self.extension().is_none() {
            return Err(SpeechError::InvalidInput(format!(
                "unsupported audio type '{}'",
                self.content_type
            )));
        }
        Ok(())
    }

    /// File extension for the content type, ignoring codec parameters
    /// such as `audio/webm;codecs=opus`.
    pub fn extension(&self) -> Option<&'static str> {
        let base = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        SUPPORTED_AUDIO
            .iter()
            .find(|(mime, _)| *mime == base)
            .map(|(_, ext)| *ext)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl SpeechClient {
    /// Transcribes a Japanese answer recording to text.
    pub async fn transcribe(&self, audio: &AudioUpload) -> Result<String, SpeechError> {
        audio.validate()?;
        let ext = audio.extension().unwrap_or("webm");
        let mut last_error: Option<SpeechError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = backoff(attempt);
                warn!(
                    "Transcription attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            // multipart forms are consumed by send(), so rebuild per attempt
            let part = Part::bytes(audio.bytes.to_vec())
                .file_name(format!("answer.{ext}"))
                .mime_str(&audio.content_type)?;
            let form = Form::new()
                .text("model", WHISPER_MODEL)
                .text("language", "ja")
                .text("response_format", "json")
                .part("file", part);

            let response = match self
                .client
                .post(WHISPER_URL)
                .bearer_auth(&self.openai_api_key)
                .multipart(form)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(SpeechError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if is_retryable(status) {
                let body = response.text().await.unwrap_or_default();
                warn!("Transcription API returned {}: {}", status, body);
                last_error = Some(SpeechError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SpeechError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let parsed: TranscriptionResponse = response.json().await?;
            debug!(
                "Transcribed {} bytes into {} chars",
                audio.bytes.len(),
                parsed.text.chars().count()
            );
            return Ok(parsed.text.trim().to_string());
        }

        Err(last_error.unwrap_or(SpeechError::EmptyContent))
    }
}
