//! OpenAI-compatible chat completions provider

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{LLMConfig, ProviderError, TextGenerator};

pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    config: LLMConfig,
}

impl OpenAIProvider {
    /// Create a provider, reading the API key from the configured environment variable
    pub fn new(config: LLMConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: LLMConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        if api_key.is_some() {
            tracing::info!("[LLM] Provider initialized for model {}", config.model);
        } else {
            tracing::warn!(
                "[LLM] Provider created without API key - {} env var not found",
                config.api_key_env
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_payload(&self, system: &str, user: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        })
    }

    fn parse_response(json: &serde_json::Value) -> Result<String, ProviderError> {
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ProviderError::ParseError("Response has no message content".to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAIProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let auth_header = self
            .api_key
            .as_ref()
            .map(|k| format!("Bearer {}", k))
            .ok_or_else(|| {
                ProviderError::AuthError(format!(
                    "No API key configured ({} is not set)",
                    self.config.api_key_env
                ))
            })?;

        let payload = self.build_payload(system, user);

        tracing::debug!(
            "[LLM] Sending request: model={}, prompt_chars={}",
            self.config.model,
            system.len() + user.len()
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", auth_header)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.config.timeout_secs)
                } else {
                    ProviderError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_after_ms = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|secs| secs * 1000);
                return Err(ProviderError::RateLimited { retry_after_ms });
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Self::parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_both_prompts() {
        let provider = OpenAIProvider::with_api_key(LLMConfig::default(), None).unwrap();
        let payload = provider.build_payload("system text", "user text");

        assert_eq!(payload["model"], "nvidia/llama-3.1-nemotron-70b-instruct");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "user text");
    }

    #[test]
    fn test_parse_response_extracts_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "  a plan  " } }]
        });
        assert_eq!(OpenAIProvider::parse_response(&json).unwrap(), "a plan");

        let empty = serde_json::json!({ "choices": [] });
        assert!(matches!(
            OpenAIProvider::parse_response(&empty),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_without_key_is_auth_error() {
        let provider = OpenAIProvider::with_api_key(LLMConfig::default(), None).unwrap();
        assert!(!provider.is_configured());

        let result = provider.generate("system", "user").await;
        assert!(matches!(result, Err(ProviderError::AuthError(_))));
    }
}
