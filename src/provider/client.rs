//! Core completion provider types and trait definitions

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

/// Stateless completion provider - each call is independent (fresh context)
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Model the provider will use when the request does not override it
    fn model(&self) -> &str;

    /// Whether the provider is usable (credentials present, etc.)
    fn is_ready(&self) -> bool {
        true
    }
}

/// A completion request - everything needed for one provider call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt for the call
    pub system_prompt: String,

    /// Rendered user prompt
    pub user_prompt: String,

    /// Model identifier
    pub model_id: String,

    /// Max tokens for the response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl CompletionRequest {
    /// Create a request with the given prompts and model.
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model_id: model_id.into(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    /// Override max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text
    pub text: String,

    /// Token usage for cost tracking
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens consumed by the call.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Fold another usage into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Calculate cost in USD
    /// Opus: $15/$75 per 1M tokens (input/output)
    /// Sonnet: $3/$15 per 1M tokens
    /// Haiku: $0.80/$4 per 1M tokens
    pub fn cost_usd(&self, model: &str) -> f64 {
        let (input_price, output_price) = match model {
            m if m.contains("opus") => (15.0, 75.0),
            m if m.contains("sonnet") => (3.0, 15.0),
            m if m.contains("haiku") => (0.80, 4.0),
            _ => (3.0, 15.0), // Default to sonnet pricing
        };

        let input_cost = (self.input_tokens as f64 / 1_000_000.0) * input_price;
        let output_cost = (self.output_tokens as f64 / 1_000_000.0) * output_price;

        input_cost + output_cost
    }
}

/// Errors that can occur during provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl ProviderError {
    /// Rate limiting gets its own backoff schedule; everything else does not.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ProviderError::Timeout(_) => true,
            ProviderError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Scripted provider for tests: pops one prepared result per call.
///
/// An exhausted script returns an InvalidResponse error, which keeps a
/// mis-scripted test loud instead of hanging.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    calls: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU64::new(0),
        }
    }

    /// Script that answers every call with the same text and usage.
    pub fn always(text: impl Into<String>, usage: TokenUsage, calls: usize) -> Self {
        let text = text.into();
        Self::new(
            (0..calls)
                .map(|_| {
                    Ok(CompletionResponse {
                        text: text.clone(),
                        usage,
                    })
                })
                .collect(),
        )
    }

    /// How many times complete() was invoked.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".to_string())))
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}
