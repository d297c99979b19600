use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::interview::interviewer::Interviewer;
use crate::llm_client::LlmClient;
use crate::speech::SpeechClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Answer audio archive.
    pub s3: S3Client,
    /// Used directly by ES correction and feedback.
    pub llm: LlmClient,
    /// Whisper transcription and Google TTS; holds the Redis client for the TTS cache.
    pub speech: SpeechClient,
    pub config: Config,
    /// Pluggable interviewer. Default: LlmInterviewer.
    pub interviewer: Arc<dyn Interviewer>,
}
