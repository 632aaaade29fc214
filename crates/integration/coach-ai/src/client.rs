//! OpenAI-compatible chat-completions client.

use crate::{AiGateway, AiRequest, AiResponse};
use async_trait::async_trait;
use coach_config::{AiConfig, ENV_AI_BASE_URL, ENV_AI_KEY};
use coach_core::{Error, Result, TokenUsage};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

/// Client for `{base_url}/v1/chat/completions`
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 450,
            temperature: 0.7,
        })
    }

    /// Build from config; fails with `UpstreamUnavailable` if the key or URL is missing
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let (Some(base_url), Some(api_key)) = (config.base_url.as_deref(), config.api_key.as_deref()) else {
            return Err(not_configured());
        };
        if !config.is_configured() {
            return Err(not_configured());
        }

        Ok(Self::new(base_url, api_key, Duration::from_secs(config.timeout_secs))?
            .model(&config.model)
            .max_tokens(config.max_tokens)
            .temperature(config.temperature))
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn body<'a>(&'a self, request: &AiRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: request.context.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt.clone(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl AiGateway for ChatCompletionsClient {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn complete(&self, request: &AiRequest) -> Result<AiResponse> {
        let start = Instant::now();
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("AI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "AI gateway returned an error");
            return Err(Error::UpstreamUnavailable(format!(
                "AI request failed: {} {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("malformed AI response: {}", e)))?;
        let result = into_response(parsed);

        tracing::debug!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            total_tokens = result.usage.and_then(|u| u.total_tokens),
            "AI completion"
        );
        Ok(result)
    }
}

fn into_response(parsed: ChatResponse) -> AiResponse {
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default();

    let usage = parsed.usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    AiResponse { text, usage }
}

fn not_configured() -> Error {
    Error::UpstreamUnavailable(format!(
        "AI is not configured; set {} and {}",
        ENV_AI_KEY, ENV_AI_BASE_URL
    ))
}

/// Stand-in used when no gateway is configured. Every call fails.
pub struct UnconfiguredGateway;

#[async_trait]
impl AiGateway for UnconfiguredGateway {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &AiRequest) -> Result<AiResponse> {
        Err(not_configured())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ChatCompletionsClient {
        ChatCompletionsClient::new("https://gateway.example/", "key", Duration::from_secs(5))
            .unwrap()
            .model("test-model")
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(client().endpoint(), "https://gateway.example/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let client = client();
        let request = AiRequest::coaching(json!({"weight": 82}), "How am I doing?");
        let body = serde_json::to_value(client.body(&request)).unwrap();

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 450);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], r#"{"weight":82}"#);
        assert_eq!(body["messages"][2]["content"], "How am I doing?");
    }

    #[test]
    fn test_response_mapping() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "Great job!"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }))
        .unwrap();

        let response = into_response(parsed);
        assert_eq!(response.text, "Great job!");
        let usage = response.usage.unwrap();
        assert_eq!(usage.input_tokens, Some(120));
        assert_eq!(usage.output_tokens, Some(30));
        assert_eq!(usage.total_tokens, Some(150));
    }

    #[test]
    fn test_response_without_choices_or_usage() {
        let parsed: ChatResponse = serde_json::from_value(json!({})).unwrap();
        let response = into_response(parsed);
        assert_eq!(response.text, "");
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_from_config_requires_key_and_url() {
        let mut config = AiConfig::default();
        assert!(matches!(
            ChatCompletionsClient::from_config(&config),
            Err(Error::UpstreamUnavailable(_))
        ));

        config.api_key = Some("k".into());
        config.base_url = Some(String::new());
        assert!(ChatCompletionsClient::from_config(&config).is_err());

        config.base_url = Some("https://gateway.example".into());
        let client = ChatCompletionsClient::from_config(&config).unwrap();
        assert_eq!(client.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_fails() {
        let request = AiRequest::coaching(json!({}), "hi");
        let err = UnconfiguredGateway.complete(&request).await.unwrap_err();
        assert!(err.to_string().contains(ENV_AI_KEY));
    }
}
