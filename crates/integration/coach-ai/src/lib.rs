//! # Coach AI
//!
//! The AI gateway collaborator. The engine only sees [`AiGateway`]; the
//! production implementation is [`ChatCompletionsClient`], which proxies to
//! an OpenAI-compatible `/v1/chat/completions` endpoint.
//!
//! No retries, no streaming: one request, one response, and any failure is
//! reported as `UpstreamUnavailable`.

pub mod client;
pub mod prompts;

pub use client::{ChatCompletionsClient, UnconfiguredGateway};
pub use prompts::SYSTEM_PROMPT;

use async_trait::async_trait;
use coach_core::{Result, TokenUsage};
use serde::{Deserialize, Serialize};

/// One completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub system: String,
    /// User profile/context, sent to the model as JSON
    pub context: serde_json::Value,
    pub prompt: String,
}

impl AiRequest {
    /// Request using the standard coaching system prompt
    pub fn coaching(context: serde_json::Value, prompt: impl Into<String>) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            context,
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Anything that can answer a completion request
#[async_trait]
pub trait AiGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &AiRequest) -> Result<AiResponse>;
}
