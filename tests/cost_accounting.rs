//! Cost attribution across a judged task
//!
//! Council plans spend money on discarded candidates and on the judge
//! itself; every cent must stay attributable. The total attributed to a
//! task equals winner + discarded + judge spend, and no candidate cost is
//! ever negative.

use async_trait::async_trait;
use conclave::config::Config;
use conclave::executor::ExecutionCoordinator;
use conclave::judge::Judge;
use conclave::metrics::Metrics;
use conclave::pricing::PricingTable;
use conclave::provider::{
    Generation, GenerationParams, ProviderAdapter, ProviderError, ProviderRegistry,
};
use conclave::router::{ExecutionPlan, ModelId, TaskType};
use std::str::FromStr;
use std::sync::Arc;

/// Adapter with exact, known token counts
struct Metered {
    model: ModelId,
    text: &'static str,
    input_tokens: u32,
    output_tokens: u32,
}

impl Metered {
    fn adapter(
        model: &str,
        text: &'static str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Arc<dyn ProviderAdapter> {
        Arc::new(Self {
            model: ModelId::from(model),
            text,
            input_tokens,
            output_tokens,
        })
    }
}

#[async_trait]
impl ProviderAdapter for Metered {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        Ok(Generation {
            text: self.text.to_string(),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            latency_ms: 100,
        })
    }
}

const CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[[providers]]
model = "writer-a"
base_url = "http://localhost:1234/v1"

[[providers]]
model = "writer-b"
base_url = "http://localhost:1234/v1"

[[providers]]
model = "arbiter"
base_url = "http://localhost:1234/v1"

[pricing]
"writer-a" = 2.0
"writer-b" = 8.0
"arbiter" = 40.0

[tasks.email_generation]
mode = "judged"
models = ["writer-a", "writer-b"]
judge_model = "arbiter"
criteria = ["clarity"]
"#;

fn coordinator(adapters: Vec<Arc<dyn ProviderAdapter>>) -> ExecutionCoordinator {
    let config = Arc::new(Config::from_str(CONFIG).expect("should parse config"));
    let registry = Arc::new(ProviderRegistry::with_adapters(adapters));
    let pricing = PricingTable::from_config(&config);
    let judge = Judge::new(Arc::clone(&registry), pricing.clone());
    let metrics = Arc::new(Metrics::new().expect("should build metrics"));
    ExecutionCoordinator::new(registry, pricing, judge, config, metrics)
}

fn plan() -> ExecutionPlan {
    ExecutionPlan::judged(
        TaskType::from("email_generation"),
        vec![ModelId::from("writer-a"), ModelId::from("writer-b")],
        ModelId::from("arbiter"),
        vec!["clarity".to_string()],
    )
    .expect("valid plan")
}

#[tokio::test]
async fn total_cost_is_additive_over_winner_discarded_and_judge() {
    let coordinator = coordinator(vec![
        // writer-a: 100k tokens total at $2/M = $0.20
        Metered::adapter("writer-a", "draft a", 60_000, 40_000),
        // writer-b: 50k tokens total at $8/M = $0.40
        Metered::adapter("writer-b", "draft b", 30_000, 20_000),
        // arbiter: 10k tokens total at $40/M = $0.40
        Metered::adapter(
            "arbiter",
            r#"{"winner": 1, "scores": [9.0, 7.0], "rationale": "crisper"}"#,
            9_000,
            1_000,
        ),
    ]);

    let outcome = coordinator
        .execute(&plan(), "write an email", &GenerationParams::default())
        .await
        .expect("should succeed");

    assert_eq!(outcome.winner.model, ModelId::from("writer-a"));
    assert!((outcome.winner.cost - 0.20).abs() < 1e-12);

    assert_eq!(outcome.discarded.len(), 1);
    assert!((outcome.discarded[0].cost - 0.40).abs() < 1e-12);

    assert!((outcome.judge_cost - 0.40).abs() < 1e-12);

    // Additivity: winner + discarded + judge
    assert!((outcome.total_cost() - 1.00).abs() < 1e-12);
}

#[tokio::test]
async fn judge_cost_is_not_attributed_to_any_candidate() {
    let coordinator = coordinator(vec![
        Metered::adapter("writer-a", "draft a", 1_000, 1_000),
        Metered::adapter("writer-b", "draft b", 1_000, 1_000),
        Metered::adapter(
            "arbiter",
            r#"{"winner": 2, "scores": [5.0, 6.0], "rationale": "ok"}"#,
            5_000,
            500,
        ),
    ]);

    let outcome = coordinator
        .execute(&plan(), "write an email", &GenerationParams::default())
        .await
        .expect("should succeed");

    // Candidate costs reflect only their own token spend
    assert!((outcome.winner.cost - 0.016).abs() < 1e-12); // 2k @ $8/M
    assert!((outcome.discarded[0].cost - 0.004).abs() < 1e-12); // 2k @ $2/M
    assert!((outcome.judge_cost - 0.22).abs() < 1e-12); // 5.5k @ $40/M
}

#[tokio::test]
async fn every_cost_is_non_negative() {
    let coordinator = coordinator(vec![
        Metered::adapter("writer-a", "draft a", 0, 0),
        Metered::adapter("writer-b", "draft b", 1, 0),
        Metered::adapter(
            "arbiter",
            r#"{"winner": 1, "scores": [5.0, 5.0], "rationale": "tie"}"#,
            0,
            1,
        ),
    ]);

    let outcome = coordinator
        .execute(&plan(), "write an email", &GenerationParams::default())
        .await
        .expect("should succeed");

    assert!(outcome.winner.cost >= 0.0);
    assert!(outcome.discarded.iter().all(|c| c.cost >= 0.0));
    assert!(outcome.judge_cost >= 0.0);
    assert!(outcome.total_cost() >= 0.0);
}
