use anyhow::{Context, Result};

use crate::llm_client::LlmProvider;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub openai_api_key: String,
    pub gemini_api_key: Option<String>,
    pub google_tts_api_key: String,
    pub llm_provider: LlmProvider,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let raw_provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = parse_provider(&raw_provider)?;
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        if llm_provider == LlmProvider::Gemini && gemini_api_key.is_none() {
            anyhow::bail!("GEMINI_API_KEY is required when LLM_PROVIDER=gemini");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            gemini_api_key,
            google_tts_api_key: require_env("GOOGLE_TTS_API_KEY")?,
            llm_provider,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// API key for the configured LLM backend.
    pub fn llm_api_key(&self) -> &str {
        match self.llm_provider {
            LlmProvider::OpenAi => &self.openai_api_key,
            LlmProvider::Gemini => self.gemini_api_key.as_deref().unwrap_or_default(),
        }
    }
}

fn parse_provider(raw: &str) -> Result<LlmProvider> {
    raw.parse::<LlmProvider>()
        .context("LLM_PROVIDER must be 'openai' or 'gemini'")
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!(parse_provider("gemini").unwrap(), LlmProvider::Gemini);
        assert_eq!(parse_provider("OPENAI").unwrap(), LlmProvider::OpenAi);
    }

    #[test]
    fn test_parse_provider_error_keeps_cause() {
        let err = parse_provider("claude").unwrap_err();
        assert_eq!(err.to_string(), "LLM_PROVIDER must be 'openai' or 'gemini'");
        assert!(format!("{err:#}").contains("unknown LLM provider 'claude'"));
    }
}
