//! Task submission endpoint
//!
//! Handles POST /v1/tasks: route the task, execute the plan, emit the
//! performance record asynchronously, and return the winning response with
//! its cost and latency. The caller either gets a complete result or a
//! single typed failure; partial-success detail lives in the performance
//! record, not the response.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;

use crate::error::AppError;
use crate::executor::TaskOutcome;
use crate::handlers::AppState;
use crate::judge::JudgeVerdict;
use crate::logger::PerformanceRecord;
use crate::metrics::PlanMode;
use crate::middleware::RequestId;
use crate::provider::GenerationParams;
use crate::router::{RoutingContext, TaskType};

/// Maximum allowed prompt length in characters (100K chars)
const MAX_PROMPT_LENGTH: usize = 100_000;

/// Task submission from a client
///
/// Validation is enforced during deserialization - invalid instances cannot
/// exist.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    task_type: String,
    prompt: String,
    context: RoutingContext,
    correlation_id: Option<String>,
}

impl SubmitRequest {
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn context(&self) -> &RoutingContext {
        &self.context
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}

/// Custom Deserialize implementation that validates during deserialization
impl<'de> Deserialize<'de> for SubmitRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawSubmitRequest {
            task_type: String,
            prompt: String,
            #[serde(default)]
            context: RoutingContext,
            #[serde(default)]
            correlation_id: Option<String>,
        }

        let raw = RawSubmitRequest::deserialize(deserializer)?;

        if raw.task_type.trim().is_empty() {
            return Err(serde::de::Error::custom("task_type cannot be empty"));
        }

        if raw.prompt.trim().is_empty() {
            return Err(serde::de::Error::custom(
                "prompt cannot be empty or contain only whitespace",
            ));
        }

        // Count Unicode characters, not bytes
        let char_count = raw.prompt.chars().count();
        if char_count > MAX_PROMPT_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "prompt exceeds maximum length of {} characters (got {})",
                MAX_PROMPT_LENGTH, char_count
            )));
        }

        Ok(SubmitRequest {
            task_type: raw.task_type,
            prompt: raw.prompt,
            context: raw.context,
            correlation_id: raw.correlation_id,
        })
    }
}

/// Task result returned to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub winning_text: String,
    pub model_used: String,
    /// USD spent on the winning candidate
    pub cost: f64,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_verdict: Option<JudgeVerdict>,
}

impl SubmitResponse {
    fn from_outcome(outcome: &TaskOutcome, latency_ms: u64) -> Self {
        Self {
            winning_text: outcome.winner.text.clone(),
            model_used: outcome.winner.model.to_string(),
            cost: outcome.winner.cost,
            latency_ms,
            judge_verdict: outcome.verdict.clone(),
        }
    }
}

/// POST /v1/tasks handler
///
/// Routing is synchronous and cheap; execution suspends until every
/// candidate call in the plan has settled (and, for councils, the judge).
/// Emitting the performance record never delays the response.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let started = Instant::now();
    let task_type = TaskType::from(request.task_type());

    let plan = state.router().route(&task_type, request.context())?;

    tracing::info!(
        request_id = %request_id,
        task_type = %task_type,
        models = ?plan.models(),
        requires_judge = plan.requires_judge(),
        "Execution plan resolved"
    );

    let params = GenerationParams::default();
    let outcome = state
        .executor()
        .execute(&plan, request.prompt(), &params)
        .await?;

    let latency_ms = started.elapsed().as_millis() as u64;
    let mode = if plan.requires_judge() {
        PlanMode::Council
    } else {
        PlanMode::Single
    };
    state.metrics().task_completed(task_type.as_str(), mode);
    state
        .metrics()
        .observe_task_duration(mode, started.elapsed().as_secs_f64());

    tracing::info!(
        request_id = %request_id,
        task_type = %task_type,
        model_used = %outcome.winner.model,
        latency_ms = latency_ms,
        total_cost = outcome.total_cost(),
        candidate_failures = outcome.failures.len(),
        "Task completed"
    );

    // The record carries the full spend breakdown; the response only the
    // winner's share.
    let correlation_id = request
        .correlation_id()
        .map(str::to_string)
        .unwrap_or_else(|| request_id.to_string());
    let record = PerformanceRecord {
        task_type: task_type.clone(),
        model_used: outcome.winner.model.clone(),
        cost: outcome.winner.cost,
        total_cost: outcome.total_cost(),
        judge_cost: outcome.judge_cost,
        latency_ms,
        verdict: outcome.verdict.clone(),
        recorded_at: chrono::Utc::now(),
        correlation_id,
    };
    state.logger().log(record);

    Ok(Json(SubmitResponse::from_outcome(&outcome, latency_ms)))
}
