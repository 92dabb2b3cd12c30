//! Error types for Conclave
//!
//! All errors implement `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::provider::ProviderError;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    /// Caller submitted a task type with no routing rule configured.
    ///
    /// Caller error - surfaced immediately, never retried.
    #[error("Unknown task type: '{task_type}'")]
    UnknownTaskType { task_type: String },

    /// Every candidate call in a plan failed (including any configured
    /// fallback). Carries all underlying provider errors so the caller can
    /// see what was attempted.
    #[error("Execution failed for task '{task_type}': all {} candidate calls failed", .failures.len())]
    ExecutionFailed {
        task_type: String,
        failures: Vec<ProviderError>,
    },

    /// Judge was invoked with fewer than two candidates.
    ///
    /// Programmer error - the coordinator gates judge invocation on having
    /// at least two successful candidates, so this should be unreachable.
    /// Fails loudly if it occurs.
    #[error("Judge requires at least two candidates, got {candidate_count}")]
    InvalidJudgeInput { candidate_count: usize },

    /// A single provider call failed outside the coordinator's recovery
    /// paths (e.g. registry construction).
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::UnknownTaskType { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::ExecutionFailed { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::Provider(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::InvalidJudgeInput { .. } => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
