use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{backoff, is_retryable, SpeechClient, SpeechError, MAX_RETRIES};

const TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
pub const DEFAULT_VOICE: &str = "ja-JP-Neural2-B";
pub const MAX_TTS_CHARS: usize = 1000;
const CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Base64-encoded MP3 ready to hand to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedSpeech {
    pub audio_content: String,
    pub voice: String,
    pub mime_type: String,
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: Option<String>,
}

/// Checks the text and resolves the voice name.
pub fn validate_tts_input<'a>(
    text: &str,
    voice: Option<&'a str>,
) -> Result<&'a str, SpeechError> {
    let chars = text.trim().chars().count();
    if chars == 0 {
        return Err(SpeechError::InvalidInput("text cannot be empty".to_string()));
    }
    if chars > MAX_TTS_CHARS {
        return Err(SpeechError::InvalidInput(format!(
            "text exceeds {MAX_TTS_CHARS} characters"
        )));
    }
    let voice = voice.unwrap_or(DEFAULT_VOICE);
    if !voice.starts_with("ja-JP-") {
        return Err(SpeechError::InvalidInput(format!(
            "voice '{voice}' is not a ja-JP voice"
        )));
    }
    Ok(voice)
}

fn cache_key(voice: &str, text: &str) -> String {
    format!("tts:{voice}:{}", text.trim())
}

impl SpeechClient {
    /// Voices `text` in Japanese, serving repeated phrases from Redis.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
    ) -> Result<SynthesizedSpeech, SpeechError> {
        let voice = validate_tts_input(text, voice)?;
        let key = cache_key(voice, text);

        if let Some(audio_content) = self.cached_audio(&key).await {
            debug!("TTS cache hit for voice {voice}");
            return Ok(SynthesizedSpeech {
                audio_content,
                voice: voice.to_string(),
                mime_type: "audio/mpeg".to_string(),
                cached: true,
            });
        }

        let body = json!({
            "input": { "text": text.trim() },
            "voice": { "languageCode": "ja-JP", "name": voice },
            "audioConfig": { "audioEncoding": "MP3", "speakingRate": 1.0 },
        });

        let mut last_error: Option<SpeechError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = backoff(attempt);
                warn!(
                    "TTS attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(TTS_URL)
                .header("x-goog-api-key", &self.tts_api_key)
                .json(&body)
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
                warn!("TTS API returned {}: {}", status, body);
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

            let parsed: SynthesizeResponse = response.json().await?;
            let audio_content = parsed
                .audio_content
                .filter(|a| !a.is_empty())
                .ok_or(SpeechError::EmptyContent)?;

            self.store_audio(&key, &audio_content).await;

            return Ok(SynthesizedSpeech {
                audio_content,
                voice: voice.to_string(),
                mime_type: "audio/mpeg".to_string(),
                cached: false,
            });
        }

        Err(last_error.unwrap_or(SpeechError::EmptyContent))
    }

    // Cache failures never fail the request.
    async fn cached_audio(&self, key: &str) -> Option<String> {
        let mut conn = match self.redis.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                warn!("TTS cache unavailable: {e}");
                return None;
            }
        };
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .unwrap_or_else(|e| {
                warn!("TTS cache read failed: {e}");
                None
            })
    }

    async fn store_audio(&self, key: &str, audio_content: &str) {
        let mut conn = match self.redis.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                warn!("TTS cache unavailable: {e}");
                return;
            }
        };
        if let Err(e) = redis::cmd("SET")
            .arg(key)
            .arg(audio_content)
            .arg("EX")
            .arg(CACHE_TTL_SECS)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!("TTS cache write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_voice_is_used() {
        assert_eq!(validate_tts_input("こんにちは", None).unwrap(), DEFAULT_VOICE);
    }

    #[test]
    fn test_blank_text_rejected() {
        assert!(validate_tts_input("   ", None).is_err());
    }

    #[test]
    fn test_limit_counts_characters_not_bytes() {
        // 1000 kana are 3000 bytes in UTF-8 but still within the limit
        let text = "あ".repeat(MAX_TTS_CHARS);
        assert!(validate_tts_input(&text, None).is_ok());
        let too_long = "あ".repeat(MAX_TTS_CHARS + 1);
        assert!(validate_tts_input(&too_long, None).is_err());
    }

    #[test]
    fn test_non_japanese_voice_rejected() {
        assert!(validate_tts_input("hello", Some("en-US-Neural2-A")).is_err());
        assert_eq!(
            validate_tts_input("はい", Some("ja-JP-Wavenet-A")).unwrap(),
            "ja-JP-Wavenet-A"
        );
    }

    #[test]
    fn test_cache_key_trims_text() {
        assert_eq!(cache_key("ja-JP-Neural2-B", " 質問 \n"), "tts:ja-JP-Neural2-B:質問");
    }
}
