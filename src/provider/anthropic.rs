//! Anthropic API provider implementation
//!
//! This module implements the CompletionProvider trait for the Anthropic
//! (Claude) Messages API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::provider::client::{
    CompletionProvider, CompletionRequest, CompletionResponse, ProviderError, TokenUsage,
};

/// Anthropic API base URL
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model to use
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Environment variable holding the API key
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Configuration for the Anthropic provider
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl AnthropicConfig {
    /// Create a new config with a specific model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Anthropic API provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
    usage: Arc<Mutex<TokenUsage>>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    ///
    /// Reads ANTHROPIC_API_KEY from environment
    pub fn new(config: AnthropicConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| ProviderError::MissingApiKey {
            env_var: API_KEY_ENV.to_string(),
        })?;

        Self::with_api_key(api_key, config)
    }

    /// Create a provider with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
            usage: Arc::new(Mutex::new(TokenUsage::default())),
        })
    }

    /// Build the request body for the Messages API
    fn build_request(&self, request: &CompletionRequest) -> Value {
        let model = if request.model_id.is_empty() {
            self.config.model.clone()
        } else {
            request.model_id.clone()
        };

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [
                { "role": "user", "content": request.user_prompt }
            ]
        });

        if !request.system_prompt.is_empty() {
            body["system"] = json!(request.system_prompt);
        }

        body
    }

    /// Parse the API response into a CompletionResponse
    fn parse_response(&self, body: Value) -> Result<CompletionResponse, ProviderError> {
        let usage = if let Some(u) = body.get("usage") {
            TokenUsage::new(
                u["input_tokens"].as_u64().unwrap_or(0),
                u["output_tokens"].as_u64().unwrap_or(0),
            )
        } else {
            TokenUsage::default()
        };

        // Track cumulative usage
        {
            let mut total = self.usage.lock().expect("usage lock poisoned");
            total.add(&usage);
        }

        let mut text = String::new();
        if let Some(blocks) = body["content"].as_array() {
            for block in blocks {
                if block["type"].as_str() == Some("text")
                    && let Some(t) = block["text"].as_str()
                {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(t);
                }
            }
        }

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "no text content in response".to_string(),
            ));
        }

        Ok(CompletionResponse { text, usage })
    }

    /// Send a request to the Anthropic API
    async fn send_request(&self, body: Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.config.timeout)
                } else {
                    ProviderError::Network(e)
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    /// Get cumulative token usage across all calls
    pub fn total_usage(&self) -> TokenUsage {
        *self.usage.lock().expect("usage lock poisoned")
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = self.build_request(&request);
        let response = self.send_request(body).await?;
        self.parse_response(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("model", &self.config.model)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> AnthropicProvider {
        AnthropicProvider::with_api_key("test-key".to_string(), AnthropicConfig::default()).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_config_with_model() {
        let config = AnthropicConfig::with_model("claude-haiku-3-5");
        assert_eq!(config.model, "claude-haiku-3-5");
    }

    #[test]
    fn test_provider_with_api_key() {
        let provider = test_provider();
        assert!(provider.is_ready());
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_empty_api_key_not_ready() {
        let provider =
            AnthropicProvider::with_api_key(String::new(), AnthropicConfig::default()).unwrap();
        assert!(!provider.is_ready());
    }

    #[test]
    fn test_build_request_basic() {
        let provider = test_provider();
        let request = CompletionRequest::new("You are helpful", "Hello", "claude-sonnet-4")
            .with_max_tokens(256);

        let body = provider.build_request(&request);

        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_build_request_empty_model_falls_back() {
        let provider = test_provider();
        let request = CompletionRequest::new("s", "u", "");

        let body = provider.build_request(&request);
        assert_eq!(body["model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_build_request_empty_system_omitted() {
        let provider = test_provider();
        let request = CompletionRequest::new("", "Hello", "m");

        let body = provider.build_request(&request);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_parse_response_text() {
        let provider = test_provider();
        let api_response = json!({
            "content": [
                { "type": "text", "text": "Hello there!" }
            ],
            "usage": {
                "input_tokens": 10,
                "output_tokens": 5
            }
        });

        let response = provider.parse_response(api_response).unwrap();
        assert_eq!(response.text, "Hello there!");
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[test]
    fn test_parse_response_joins_blocks() {
        let provider = test_provider();
        let api_response = json!({
            "content": [
                { "type": "text", "text": "part one" },
                { "type": "text", "text": "part two" }
            ],
            "usage": { "input_tokens": 1, "output_tokens": 1 }
        });

        let response = provider.parse_response(api_response).unwrap();
        assert_eq!(response.text, "part one\npart two");
    }

    #[test]
    fn test_parse_response_empty_is_invalid() {
        let provider = test_provider();
        let api_response = json!({
            "content": [],
            "usage": { "input_tokens": 0, "output_tokens": 0 }
        });

        let result = provider.parse_response(api_response);
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn test_total_usage_accumulation() {
        let provider = test_provider();

        let _ = provider.parse_response(json!({
            "content": [{ "type": "text", "text": "a" }],
            "usage": { "input_tokens": 100, "output_tokens": 50 }
        }));
        let _ = provider.parse_response(json!({
            "content": [{ "type": "text", "text": "b" }],
            "usage": { "input_tokens": 200, "output_tokens": 100 }
        }));

        let total = provider.total_usage();
        assert_eq!(total.input_tokens, 300);
        assert_eq!(total.output_tokens, 150);
    }

    #[test]
    fn test_debug_impl_hides_key() {
        let provider = test_provider();
        let debug_str = format!("{:?}", provider);
        assert!(debug_str.contains("AnthropicProvider"));
        assert!(!debug_str.contains("test-key"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnthropicProvider>();
    }
}
