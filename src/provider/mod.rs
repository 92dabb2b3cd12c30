//! Provider adapter abstraction
//!
//! The execution coordinator codes against the `ProviderAdapter` trait;
//! concrete backends are external collaborators behind an OpenAI-compatible
//! HTTP implementation. Adapters are object-safe and shared as
//! `Arc<dyn ProviderAdapter>` through the registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::router::ModelId;

pub mod http;

pub use http::HttpProviderAdapter;

/// Broad classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The per-call deadline elapsed before the backend responded
    Timeout,
    /// DNS, connection, or transport failure before a response arrived
    Network,
    /// The backend rejected the call for rate/quota reasons (HTTP 429)
    Quota,
    /// The backend returned a non-success status (4xx/5xx other than 429)
    Upstream,
    /// The backend responded but the body did not match the expected shape
    InvalidResponse,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Network => "network error",
            Self::Quota => "quota exceeded",
            Self::Upstream => "upstream error",
            Self::InvalidResponse => "invalid response",
        };
        write!(f, "{}", label)
    }
}

/// One adapter call's typed failure, carrying the model that failed
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind} from '{model}': {message}")]
pub struct ProviderError {
    pub model: ModelId,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(model: ModelId, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            model,
            kind,
            message: message.into(),
        }
    }

    /// Build the timeout variant with a consistent message
    pub fn timeout(model: ModelId, timeout_seconds: u64) -> Self {
        Self::new(
            model,
            ProviderErrorKind::Timeout,
            format!("call exceeded {}s deadline", timeout_seconds),
        )
    }
}

/// Optional per-call sampling overrides
///
/// When a field is `None`, the backend's configured default is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Raw output of one successful adapter call, before costing
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
}

/// One model's costed response to a prompt, prior to any judging
///
/// Produced once per successful adapter call; immutable thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResponse {
    pub model: ModelId,
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    /// USD, computed as `(total_tokens / 1_000_000) * pricing[model]`
    pub cost: f64,
}

impl CandidateResponse {
    pub fn from_generation(model: ModelId, generation: Generation, cost: f64) -> Self {
        Self {
            model,
            text: generation.text,
            input_tokens: generation.input_tokens,
            output_tokens: generation.output_tokens,
            latency_ms: generation.latency_ms,
            cost,
        }
    }
}

/// Uniform interface to a single text-generation backend
///
/// Object-safe and designed to be used as `Arc<dyn ProviderAdapter>`.
/// Implementations must be cancellation-safe: the coordinator drops the
/// future when its per-call deadline elapses, which must abort any
/// in-flight request.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// The model identifier this adapter serves
    fn model(&self) -> &ModelId;

    /// Execute one generation call
    ///
    /// # Returns
    ///
    /// - `Ok(Generation)` with text, token counts, and wall-clock latency
    /// - `Err(ProviderError)` carrying this adapter's model id and the
    ///   failure classification
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ProviderError>;
}

/// Model id -> adapter lookup, built once at startup
///
/// Config validation guarantees every routed model resolves here, so a
/// failed lookup at request time is a bug, not a retryable condition.
pub struct ProviderRegistry {
    adapters: HashMap<ModelId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Build HTTP adapters for every configured provider
    ///
    /// All adapters share one connection-pooled `reqwest::Client`.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let client = Arc::new(
            reqwest::Client::builder()
                .build()
                .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?,
        );

        let adapters = config
            .providers()
            .iter()
            .map(|provider| {
                let adapter = HttpProviderAdapter::from_config(provider, Arc::clone(&client));
                (
                    provider.model().clone(),
                    Arc::new(adapter) as Arc<dyn ProviderAdapter>,
                )
            })
            .collect();

        Ok(Self { adapters })
    }

    /// Build a registry from pre-constructed adapters (used by tests and
    /// embedders that supply their own backends)
    pub fn with_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters: adapters
                .into_iter()
                .map(|a| (a.model().clone(), a))
                .collect(),
        }
    }

    /// Resolve the adapter for a model
    pub fn get(&self, model: &ModelId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(model).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display_names_model_and_kind() {
        let err = ProviderError::new(
            ModelId::from("claude-sonnet-4"),
            ProviderErrorKind::Quota,
            "429 Too Many Requests",
        );
        assert_eq!(
            err.to_string(),
            "quota exceeded from 'claude-sonnet-4': 429 Too Many Requests"
        );
    }

    #[test]
    fn test_timeout_constructor_message() {
        let err = ProviderError::timeout(ModelId::from("gpt-4o"), 30);
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert!(err.message.contains("30s"));
    }

    #[test]
    fn test_candidate_response_from_generation() {
        let generation = Generation {
            text: "hello".to_string(),
            input_tokens: 120,
            output_tokens: 80,
            latency_ms: 450,
        };
        let candidate =
            CandidateResponse::from_generation(ModelId::from("deepseek-v3"), generation, 0.00018);

        assert_eq!(candidate.model.as_str(), "deepseek-v3");
        assert_eq!(candidate.input_tokens, 120);
        assert_eq!(candidate.output_tokens, 80);
        assert_eq!(candidate.cost, 0.00018);
    }

    #[test]
    fn test_registry_lookup_by_model() {
        struct Fixed(ModelId);

        #[async_trait]
        impl ProviderAdapter for Fixed {
            fn model(&self) -> &ModelId {
                &self.0
            }

            async fn generate(
                &self,
                _prompt: &str,
                _params: &GenerationParams,
            ) -> Result<Generation, ProviderError> {
                Ok(Generation {
                    text: "ok".to_string(),
                    input_tokens: 1,
                    output_tokens: 1,
                    latency_ms: 1,
                })
            }
        }

        let registry =
            ProviderRegistry::with_adapters(vec![Arc::new(Fixed(ModelId::from("m-1")))]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&ModelId::from("m-1")).is_some());
        assert!(registry.get(&ModelId::from("m-2")).is_none());
    }
}
