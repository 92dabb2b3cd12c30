//! Plan execution for Conclave
//!
//! The coordinator turns an execution plan into provider calls. Single-model
//! plans get one call plus an optional one-shot fallback; council plans fan
//! out concurrently and join at a barrier - every call settles (success or
//! failure) before any result is used, because the goal of a council is
//! quality, not first-response latency.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::judge::{Judge, JudgeVerdict};
use crate::metrics::Metrics;
use crate::pricing::PricingTable;
use crate::provider::{
    CandidateResponse, GenerationParams, ProviderError, ProviderErrorKind, ProviderRegistry,
};
use crate::router::{ExecutionPlan, ModelId};

/// Everything produced by one task execution
///
/// Owned exclusively by the task flow that created it and discarded once
/// the performance record is emitted. Discarded candidates are retained
/// because council plans spend money on losers and that spend must stay
/// attributable.
#[derive(Debug)]
pub struct TaskOutcome {
    pub winner: CandidateResponse,
    /// Present only for judged plans where >= 2 candidates succeeded
    pub verdict: Option<JudgeVerdict>,
    /// Candidate calls that failed (timeout, transport, quota, ...)
    pub failures: Vec<ProviderError>,
    /// Successful candidates that lost the judging
    pub discarded: Vec<CandidateResponse>,
    /// USD spent on the judge call itself, never attributed to a candidate
    pub judge_cost: f64,
    pub judge_latency_ms: u64,
}

impl TaskOutcome {
    fn single(winner: CandidateResponse, failures: Vec<ProviderError>) -> Self {
        Self {
            winner,
            verdict: None,
            failures,
            discarded: Vec::new(),
            judge_cost: 0.0,
            judge_latency_ms: 0,
        }
    }

    /// Total spend attributed to this task: winner + discarded candidates
    /// + the judge call
    pub fn total_cost(&self) -> f64 {
        self.winner.cost
            + self.discarded.iter().map(|c| c.cost).sum::<f64>()
            + self.judge_cost
    }
}

/// Executes routing plans against the provider registry
pub struct ExecutionCoordinator {
    registry: Arc<ProviderRegistry>,
    pricing: PricingTable,
    judge: Judge,
    config: Arc<Config>,
    metrics: Arc<Metrics>,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        pricing: PricingTable,
        judge: Judge,
        config: Arc<Config>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            pricing,
            judge,
            config,
            metrics,
        }
    }

    /// Execute a plan and return the winning response
    ///
    /// # Errors
    ///
    /// - `AppError::ExecutionFailed` when zero candidates succeed (after
    ///   the fallback for single-model plans), carrying every underlying
    ///   provider error.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        prompt: &str,
        params: &GenerationParams,
    ) -> AppResult<TaskOutcome> {
        let timeout_seconds = self.config.timeout_for_task(plan.task_type());

        if plan.requires_judge() {
            self.execute_council(plan, prompt, params, timeout_seconds)
                .await
        } else {
            self.execute_single(plan, prompt, params, timeout_seconds)
                .await
        }
    }

    /// Single-model plan: one call, then at most one fallback call
    async fn execute_single(
        &self,
        plan: &ExecutionPlan,
        prompt: &str,
        params: &GenerationParams,
        timeout_seconds: u64,
    ) -> AppResult<TaskOutcome> {
        let model = &plan.models()[0];

        match self.call_candidate(model, prompt, params, timeout_seconds).await {
            Ok(winner) => Ok(TaskOutcome::single(winner, Vec::new())),
            Err(primary_error) => {
                self.metrics.candidate_failure(model.as_str());

                let Some(fallback_model) = self.config.fallback_for(plan.task_type()) else {
                    tracing::error!(
                        task_type = %plan.task_type(),
                        model = %model,
                        error = %primary_error,
                        "Candidate call failed and no fallback is configured"
                    );
                    return Err(AppError::ExecutionFailed {
                        task_type: plan.task_type().to_string(),
                        failures: vec![primary_error],
                    });
                };

                tracing::warn!(
                    task_type = %plan.task_type(),
                    model = %model,
                    fallback_model = %fallback_model,
                    error = %primary_error,
                    "Candidate call failed, retrying once against fallback model"
                );

                match self
                    .call_candidate(fallback_model, prompt, params, timeout_seconds)
                    .await
                {
                    Ok(winner) => Ok(TaskOutcome::single(winner, vec![primary_error])),
                    Err(fallback_error) => {
                        self.metrics.candidate_failure(fallback_model.as_str());
                        tracing::error!(
                            task_type = %plan.task_type(),
                            model = %model,
                            fallback_model = %fallback_model,
                            "Fallback call also failed"
                        );
                        Err(AppError::ExecutionFailed {
                            task_type: plan.task_type().to_string(),
                            failures: vec![primary_error, fallback_error],
                        })
                    }
                }
            }
        }
    }

    /// Council plan: concurrent fan-out, barrier fan-in, then judging
    async fn execute_council(
        &self,
        plan: &ExecutionPlan,
        prompt: &str,
        params: &GenerationParams,
        timeout_seconds: u64,
    ) -> AppResult<TaskOutcome> {
        // Each call owns its future and buffer; the only synchronization
        // point is the join below, which waits for ALL calls to settle.
        // No early return on first success.
        let calls = plan
            .models()
            .iter()
            .map(|model| self.call_candidate(model, prompt, params, timeout_seconds));
        let results = futures::future::join_all(calls).await;

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(candidate) => candidates.push(candidate),
                Err(error) => {
                    self.metrics.candidate_failure(error.model.as_str());
                    failures.push(error);
                }
            }
        }

        tracing::info!(
            task_type = %plan.task_type(),
            council_size = plan.models().len(),
            succeeded = candidates.len(),
            failed = failures.len(),
            "Council fan-out settled"
        );

        match candidates.len() {
            0 => Err(AppError::ExecutionFailed {
                task_type: plan.task_type().to_string(),
                failures,
            }),
            // Judging a single candidate is meaningless; return it directly.
            1 => {
                let winner = candidates.into_iter().next().expect("len checked above");
                Ok(TaskOutcome::single(winner, failures))
            }
            _ => {
                let judged = self
                    .judge
                    .evaluate(plan, prompt, &candidates, timeout_seconds)
                    .await?;
                if judged.verdict.fallback {
                    self.metrics.judge_fallback();
                }

                let winner = candidates.remove(judged.verdict.winner_index);
                Ok(TaskOutcome {
                    winner,
                    verdict: Some(judged.verdict),
                    failures,
                    discarded: candidates,
                    judge_cost: judged.judge_cost,
                    judge_latency_ms: judged.judge_latency_ms,
                })
            }
        }
    }

    /// One adapter call under its own deadline, costed on success
    ///
    /// Exceeding the deadline cancels this call only - sibling calls in the
    /// same fan-out keep running.
    async fn call_candidate(
        &self,
        model: &ModelId,
        prompt: &str,
        params: &GenerationParams,
        timeout_seconds: u64,
    ) -> Result<CandidateResponse, ProviderError> {
        let adapter = self.registry.get(model).ok_or_else(|| {
            // Config validation guarantees every routed model has an
            // adapter, so this indicates a bug rather than a bad request.
            ProviderError::new(
                model.clone(),
                ProviderErrorKind::InvalidResponse,
                "no provider adapter registered for routed model",
            )
        })?;

        let call = adapter.generate(prompt, params);
        match tokio::time::timeout(Duration::from_secs(timeout_seconds), call).await {
            Ok(Ok(generation)) => {
                let cost = self
                    .pricing
                    .cost(model, generation.input_tokens, generation.output_tokens)
                    .unwrap_or_else(|| {
                        tracing::error!(
                            model = %model,
                            "Routed model missing from pricing table despite startup validation"
                        );
                        0.0
                    });
                Ok(CandidateResponse::from_generation(
                    model.clone(),
                    generation,
                    cost,
                ))
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    model = %model,
                    kind = ?error.kind,
                    error = %error,
                    "Candidate call failed"
                );
                Err(error)
            }
            Err(_elapsed) => {
                tracing::warn!(
                    model = %model,
                    timeout_seconds = timeout_seconds,
                    "Candidate call exceeded deadline, cancelled"
                );
                Err(ProviderError::timeout(model.clone(), timeout_seconds))
            }
        }
    }
}
