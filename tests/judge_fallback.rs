//! Judge fallback safety
//!
//! A malformed judge response must never surface as an error to the
//! execution coordinator: it resolves to the first candidate with a
//! rationale recording the fallback. Judge transport failures and timeouts
//! follow the same path.

use async_trait::async_trait;
use conclave::error::AppError;
use conclave::judge::Judge;
use conclave::pricing::PricingTable;
use conclave::provider::{
    CandidateResponse, Generation, GenerationParams, ProviderAdapter, ProviderError,
    ProviderErrorKind, ProviderRegistry,
};
use conclave::router::{ExecutionPlan, ModelId, TaskType};
use std::sync::Arc;
use std::time::Duration;

/// Judge adapter with a scripted reply (or failure)
struct ScriptedJudge {
    model: ModelId,
    reply: Result<&'static str, ProviderErrorKind>,
    delay: Duration,
}

impl ScriptedJudge {
    fn replying(reply: &'static str) -> Arc<dyn ProviderAdapter> {
        Arc::new(Self {
            model: ModelId::from("arbiter"),
            reply: Ok(reply),
            delay: Duration::ZERO,
        })
    }

    fn failing(kind: ProviderErrorKind) -> Arc<dyn ProviderAdapter> {
        Arc::new(Self {
            model: ModelId::from("arbiter"),
            reply: Err(kind),
            delay: Duration::ZERO,
        })
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedJudge {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.reply {
            Ok(text) => Ok(Generation {
                text: text.to_string(),
                input_tokens: 800,
                output_tokens: 60,
                latency_ms: 120,
            }),
            Err(kind) => Err(ProviderError::new(self.model.clone(), kind, "scripted")),
        }
    }
}

fn judge_with(adapter: Arc<dyn ProviderAdapter>) -> Judge {
    let registry = Arc::new(ProviderRegistry::with_adapters(vec![adapter]));
    let pricing = PricingTable::from_rates([(ModelId::from("arbiter"), 45.0)]);
    Judge::new(registry, pricing)
}

fn council_plan() -> ExecutionPlan {
    ExecutionPlan::judged(
        TaskType::from("email_generation"),
        vec![ModelId::from("writer-a"), ModelId::from("writer-b")],
        ModelId::from("arbiter"),
        vec!["personalization".to_string(), "tone".to_string()],
    )
    .expect("valid plan")
}

fn candidates() -> Vec<CandidateResponse> {
    vec![
        CandidateResponse {
            model: ModelId::from("writer-a"),
            text: "Hi there, quick question about your site".to_string(),
            input_tokens: 400,
            output_tokens: 120,
            latency_ms: 900,
            cost: 0.004,
        },
        CandidateResponse {
            model: ModelId::from("writer-b"),
            text: "Hello! I noticed something on your homepage".to_string(),
            input_tokens: 400,
            output_tokens: 150,
            latency_ms: 1_100,
            cost: 0.005,
        },
    ]
}

#[tokio::test]
async fn valid_verdict_is_passed_through() {
    let judge = judge_with(ScriptedJudge::replying(
        r#"{"winner": 2, "scores": [6.0, 8.5], "rationale": "concrete observation"}"#,
    ));

    let outcome = judge
        .evaluate(&council_plan(), "write an email", &candidates(), 30)
        .await
        .expect("judging should succeed");

    assert_eq!(outcome.verdict.winner_index, 1);
    assert!(!outcome.verdict.fallback);
    assert_eq!(outcome.verdict.scores, vec![6.0, 8.5]);
    // 860 tokens at $45/M
    assert!((outcome.judge_cost - 0.0387).abs() < 1e-9);
}

#[tokio::test]
async fn malformed_response_falls_back_without_error() {
    let judge = judge_with(ScriptedJudge::replying(
        "Both are fine but I slightly prefer the second one.",
    ));

    let outcome = judge
        .evaluate(&council_plan(), "write an email", &candidates(), 30)
        .await
        .expect("parse failure must not raise");

    assert_eq!(outcome.verdict.winner_index, 0);
    assert!(outcome.verdict.fallback);
    assert_eq!(outcome.verdict.rationale, "fallback: parse failure");
    // The judge call still happened and still cost money
    assert!(outcome.judge_cost > 0.0);
}

#[tokio::test]
async fn out_of_range_winner_falls_back() {
    let judge = judge_with(ScriptedJudge::replying(
        r#"{"winner": 7, "scores": [6.0, 8.5], "rationale": "??"}"#,
    ));

    let outcome = judge
        .evaluate(&council_plan(), "write an email", &candidates(), 30)
        .await
        .expect("out-of-range winner must not raise");

    assert_eq!(outcome.verdict.winner_index, 0);
    assert!(outcome.verdict.fallback);
}

#[tokio::test]
async fn judge_transport_error_falls_back() {
    let judge = judge_with(ScriptedJudge::failing(ProviderErrorKind::Upstream));

    let outcome = judge
        .evaluate(&council_plan(), "write an email", &candidates(), 30)
        .await
        .expect("judge failure must not raise");

    assert_eq!(outcome.verdict.winner_index, 0);
    assert!(outcome.verdict.fallback);
    assert!(
        outcome.verdict.rationale.starts_with("fallback: judge error:"),
        "rationale records the cause, got: {}",
        outcome.verdict.rationale
    );
    assert_eq!(outcome.judge_cost, 0.0, "failed call spends nothing");
}

#[tokio::test(start_paused = true)]
async fn judge_timeout_falls_back() {
    let slow: Arc<dyn ProviderAdapter> = Arc::new(ScriptedJudge {
        model: ModelId::from("arbiter"),
        reply: Ok(r#"{"winner": 1, "scores": [9, 2], "rationale": "late"}"#),
        delay: Duration::from_secs(120),
    });
    let judge = judge_with(slow);

    let outcome = judge
        .evaluate(&council_plan(), "write an email", &candidates(), 30)
        .await
        .expect("judge timeout must not raise");

    assert!(outcome.verdict.fallback);
    assert!(
        outcome.verdict.rationale.contains("timeout"),
        "got: {}",
        outcome.verdict.rationale
    );
}

#[tokio::test]
async fn fewer_than_two_candidates_fails_loudly() {
    let judge = judge_with(ScriptedJudge::replying("unused"));
    let one_candidate = vec![candidates().remove(0)];

    let result = judge
        .evaluate(&council_plan(), "write an email", &one_candidate, 30)
        .await;

    match result {
        Err(AppError::InvalidJudgeInput { candidate_count }) => {
            assert_eq!(candidate_count, 1);
        }
        other => panic!("Expected InvalidJudgeInput, got {:?}", other.map(|_| ())),
    }
}
