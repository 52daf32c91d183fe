//! Completion provider layer - remote text-completion calls behind one trait
//!
//! This module provides:
//! - Request/response types for completion calls
//! - CompletionProvider trait for API abstraction
//! - AnthropicProvider reference implementation
//! - ScriptedProvider for deterministic tests

pub mod anthropic;
pub mod client;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use client::{
    CompletionProvider, CompletionRequest, CompletionResponse, ProviderError, ScriptedProvider,
    TokenUsage,
};
