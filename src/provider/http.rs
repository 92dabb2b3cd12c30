//! OpenAI-compatible HTTP provider adapter
//!
//! Talks to any backend exposing `/v1/chat/completions` (OpenRouter, vLLM,
//! LM Studio, llama.cpp server). Token counts come from the response usage
//! block when present, falling back to a chars/4 heuristic so cost is
//! always attributable.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::{Generation, GenerationParams, ProviderAdapter, ProviderError, ProviderErrorKind};
use crate::config::ProviderConfig;
use crate::router::ModelId;

/// Adapter for one model behind an OpenAI-compatible endpoint
pub struct HttpProviderAdapter {
    model: ModelId,
    base_url: String,
    max_tokens: u32,
    temperature: f64,
    api_key: Option<String>,
    /// Shared across all adapters for connection pooling
    client: Arc<Client>,
}

impl HttpProviderAdapter {
    /// Build an adapter from validated provider configuration
    ///
    /// The API key is resolved from the configured environment variable
    /// once, at startup. A configured-but-unset variable leaves the
    /// adapter unauthenticated; local backends don't need a key and remote
    /// ones will reject the call with a clear upstream error.
    pub fn from_config(provider: &ProviderConfig, client: Arc<Client>) -> Self {
        let api_key = provider.api_key_env().and_then(|var| match std::env::var(var) {
            Ok(key) => Some(key),
            Err(_) => {
                tracing::warn!(
                    model = %provider.model(),
                    env_var = var,
                    "API key environment variable is not set; calls will be unauthenticated"
                );
                None
            }
        });

        Self {
            model: provider.model().clone(),
            base_url: provider.base_url().to_string(),
            max_tokens: provider.max_tokens(),
            temperature: provider.temperature(),
            api_key,
            client,
        }
    }

    fn error(&self, kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError::new(self.model.clone(), kind, message)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Token estimate used when a backend omits the usage block (chars / 4)
fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() / 4) as u32
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: self.model.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: params.max_tokens.unwrap_or(self.max_tokens),
            temperature: params.temperature.unwrap_or(self.temperature),
        };

        let started = Instant::now();

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                self.error(ProviderErrorKind::Timeout, e.to_string())
            } else {
                self.error(ProviderErrorKind::Network, e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.error(
                ProviderErrorKind::Quota,
                format!("429 Too Many Requests: {}", detail),
            ));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.error(
                ProviderErrorKind::Upstream,
                format!("HTTP {}: {}", status.as_u16(), detail),
            ));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            self.error(
                ProviderErrorKind::InvalidResponse,
                format!("Failed to parse completion response: {}", e),
            )
        })?;

        let latency_ms = started.elapsed().as_millis() as u64;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                self.error(
                    ProviderErrorKind::InvalidResponse,
                    "Completion response contained no choices",
                )
            })?;

        let (input_tokens, output_tokens) = match parsed.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => {
                tracing::debug!(
                    model = %self.model,
                    "Backend omitted usage block, estimating token counts"
                );
                (estimate_tokens(prompt), estimate_tokens(&text))
            }
        };

        tracing::debug!(
            model = %self.model,
            latency_ms = latency_ms,
            input_tokens = input_tokens,
            output_tokens = output_tokens,
            "Generation completed"
        );

        Ok(Generation {
            text,
            input_tokens,
            output_tokens,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_heuristic() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(1000)), 250);
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatCompletionRequest {
            model: "deepseek-v3",
            messages: vec![ChatMessage {
                role: "user",
                content: "classify this lead",
            }],
            max_tokens: 512,
            temperature: 0.3,
        };
        let json = serde_json::to_value(&body).expect("should serialize");
        assert_eq!(json["model"], "deepseek-v3");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 512);
    }

    #[test]
    fn test_response_parses_with_usage() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "qualified"}}],
            "usage": {"prompt_tokens": 42, "completion_tokens": 3, "total_tokens": 45}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).expect("should parse");
        assert_eq!(parsed.choices.len(), 1);
        let usage = parsed.usage.expect("usage present");
        assert_eq!(usage.prompt_tokens, 42);
        assert_eq!(usage.completion_tokens, 3);
    }

    #[test]
    fn test_response_parses_without_usage() {
        let json = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).expect("should parse");
        assert!(parsed.usage.is_none());
    }
}
