//! Text-generation collaborators behind the study agents

mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub use openai::OpenAIProvider;

/// Error type for text-generation calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),
}

/// Opaque text generation: a system prompt and a user prompt in, text out
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

/// Settings for the OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct LLMConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://integrate.api.nvidia.com/v1/chat/completions".to_string(),
            model: "nvidia/llama-3.1-nemotron-70b-instruct".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            api_key_env: "NEMOTRON_70B_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}
