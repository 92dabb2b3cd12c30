//! Judge-based winner selection for council plans
//!
//! Builds a single blinded evaluation prompt over two or more candidate
//! responses, asks a designated judge model for a structured verdict, and
//! parses it. Parsing is total: a malformed or out-of-range verdict, an
//! empty response, or a failed judge call all degrade to a deterministic
//! tie-break (first candidate) with the fallback recorded in the verdict's
//! rationale. The judge never raises a parse failure to the coordinator.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::pricing::PricingTable;
use crate::provider::{CandidateResponse, GenerationParams, ProviderRegistry};
use crate::router::ExecutionPlan;

/// Characters of the original request included in the evaluation prompt.
/// Candidates are judged in full; the request is context, not the subject,
/// and truncating it bounds prompt-injection surface and judge cost.
const MAX_REQUEST_CONTEXT_CHARS: usize = 2_000;

/// The judge's ranking of one council's candidates
///
/// Scores are unitless and only meaningful for ranking within this single
/// judging call; they are not comparable across calls or task types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Index of the winning candidate in the list passed to the judge
    pub winner_index: usize,
    /// Per-candidate total scores, in candidate order (empty on fallback)
    pub scores: Vec<f64>,
    pub rationale: String,
    /// True when this verdict was synthesized by the fallback tie-break
    /// rather than parsed from the judge model
    pub fallback: bool,
}

impl JudgeVerdict {
    /// Synthesize the deterministic fallback verdict: first candidate wins
    pub fn fallback(reason: impl AsRef<str>) -> Self {
        Self {
            winner_index: 0,
            scores: Vec::new(),
            rationale: format!("fallback: {}", reason.as_ref()),
            fallback: true,
        }
    }
}

/// Result of one judging call, with the judge's own spend accounted
/// separately from any candidate
#[derive(Debug, Clone)]
pub struct JudgeOutcome {
    pub verdict: JudgeVerdict,
    /// USD spent on the judge call itself (0 if the call failed)
    pub judge_cost: f64,
    pub judge_latency_ms: u64,
}

/// Winner selection over council candidates
#[derive(Clone)]
pub struct Judge {
    registry: Arc<ProviderRegistry>,
    pricing: PricingTable,
}

impl Judge {
    pub fn new(registry: Arc<ProviderRegistry>, pricing: PricingTable) -> Self {
        Self { registry, pricing }
    }

    /// Evaluate candidates and pick a winner
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidJudgeInput` if fewer than two candidates are
    ///   supplied. The coordinator gates on this, so reaching it is a bug
    ///   and it fails loudly rather than guessing.
    /// - `AppError::Internal` if the plan has no judge model or the judge
    ///   model has no registered adapter (both prevented by config
    ///   validation).
    ///
    /// Judge call failures and unparseable verdicts are NOT errors: they
    /// resolve to the fallback verdict.
    pub async fn evaluate(
        &self,
        plan: &ExecutionPlan,
        original_prompt: &str,
        candidates: &[CandidateResponse],
        timeout_seconds: u64,
    ) -> AppResult<JudgeOutcome> {
        if candidates.len() < 2 {
            return Err(AppError::InvalidJudgeInput {
                candidate_count: candidates.len(),
            });
        }

        let judge_model = plan.judge_model().ok_or_else(|| {
            AppError::Internal(format!(
                "Judge invoked for task '{}' whose plan has no judge model",
                plan.task_type()
            ))
        })?;
        let adapter = self.registry.get(judge_model).ok_or_else(|| {
            AppError::Internal(format!(
                "No provider adapter registered for judge model '{}'",
                judge_model
            ))
        })?;

        let evaluation_prompt = build_evaluation_prompt(original_prompt, plan.criteria(), candidates);
        // Deterministic sampling for the verdict; creativity is the
        // candidates' job, not the judge's.
        let params = GenerationParams {
            temperature: Some(0.0),
            max_tokens: None,
        };

        let call = adapter.generate(&evaluation_prompt, &params);
        let generation = match tokio::time::timeout(Duration::from_secs(timeout_seconds), call).await
        {
            Ok(Ok(generation)) => generation,
            Ok(Err(e)) => {
                tracing::warn!(
                    task_type = %plan.task_type(),
                    judge_model = %judge_model,
                    error = %e,
                    "Judge call failed, falling back to first candidate"
                );
                return Ok(JudgeOutcome {
                    verdict: JudgeVerdict::fallback(format!("judge error: {}", e)),
                    judge_cost: 0.0,
                    judge_latency_ms: 0,
                });
            }
            Err(_elapsed) => {
                tracing::warn!(
                    task_type = %plan.task_type(),
                    judge_model = %judge_model,
                    timeout_seconds = timeout_seconds,
                    "Judge call timed out, falling back to first candidate"
                );
                return Ok(JudgeOutcome {
                    verdict: JudgeVerdict::fallback(format!(
                        "judge timeout after {}s",
                        timeout_seconds
                    )),
                    judge_cost: 0.0,
                    judge_latency_ms: 0,
                });
            }
        };

        let judge_cost = self
            .pricing
            .cost(judge_model, generation.input_tokens, generation.output_tokens)
            .unwrap_or(0.0);
        let judge_latency_ms = generation.latency_ms;

        let verdict = match parse_verdict(&generation.text, candidates.len()) {
            Some(verdict) => {
                tracing::debug!(
                    task_type = %plan.task_type(),
                    winner_index = verdict.winner_index,
                    judge_model = %judge_model,
                    "Judge verdict parsed"
                );
                verdict
            }
            None => {
                tracing::warn!(
                    task_type = %plan.task_type(),
                    judge_model = %judge_model,
                    response_length = generation.text.len(),
                    "Judge response unparseable, falling back to first candidate"
                );
                JudgeVerdict::fallback("parse failure")
            }
        };

        Ok(JudgeOutcome {
            verdict,
            judge_cost,
            judge_latency_ms,
        })
    }
}

/// Build the blinded evaluation prompt
///
/// Candidates are presented as anonymous numbered entries in the order
/// received - never labeled with model names - so the judge cannot exhibit
/// brand bias. The order itself carries no meaning.
fn build_evaluation_prompt(
    original_prompt: &str,
    criteria: &[String],
    candidates: &[CandidateResponse],
) -> String {
    let request_context: String = if original_prompt.chars().count() > MAX_REQUEST_CONTEXT_CHARS {
        let truncated: String = original_prompt
            .chars()
            .take(MAX_REQUEST_CONTEXT_CHARS)
            .collect();
        format!("{}... [truncated]", truncated)
    } else {
        original_prompt.to_string()
    };

    let mut prompt = format!(
        "You are judging {count} anonymous candidate responses to the same request.\n\n\
         Original request:\n{request}\n\n\
         Evaluation criteria: {criteria}\n\n",
        count = candidates.len(),
        request = request_context,
        criteria = criteria.join(", "),
    );

    for (position, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "Candidate {number}:\n{text}\n\n",
            number = position + 1,
            text = candidate.text,
        ));
    }

    prompt.push_str(&format!(
        "Score each candidate from 1 to 10 against the criteria, then reply with \
         ONLY a JSON object in exactly this shape:\n\
         {{\"winner\": <candidate number, 1-{count}>, \
         \"scores\": [<one total score per candidate, in order>], \
         \"rationale\": \"<one or two sentences>\"}}\n\
         Do not include any other text.",
        count = candidates.len(),
    ));

    prompt
}

#[derive(Deserialize)]
struct RawVerdict {
    winner: i64,
    #[serde(default)]
    scores: Vec<f64>,
    #[serde(default)]
    rationale: String,
}

/// Parse the judge model's raw text into a verdict
///
/// Tolerates prose or code fences around the JSON object by extracting the
/// outermost `{...}` span. Returns `None` (fallback) when the JSON is
/// missing or malformed, the declared winner is out of range, or the score
/// list doesn't cover every candidate.
fn parse_verdict(response: &str, candidate_count: usize) -> Option<JudgeVerdict> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }

    let raw: RawVerdict = serde_json::from_str(&response[start..=end]).ok()?;

    // The prompt numbers candidates from 1
    if raw.winner < 1 || raw.winner as usize > candidate_count {
        return None;
    }
    if raw.scores.len() != candidate_count || raw.scores.iter().any(|s| !s.is_finite()) {
        return None;
    }

    Some(JudgeVerdict {
        winner_index: (raw.winner - 1) as usize,
        scores: raw.scores,
        rationale: raw.rationale,
        fallback: false,
    })
}
