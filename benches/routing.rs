//! Routing performance benchmarks
//!
//! Measures the non-I/O routing path: plan resolution for each rule mode
//! and configuration parsing. Routing runs on every request, so it should
//! stay in the sub-microsecond range; config parsing is a one-time startup
//! cost where double-digit microseconds are acceptable.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::str::FromStr;

use conclave::config::Config;
use conclave::router::{RoutingContext, TaskRouter, TaskType};

const BENCH_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[[providers]]
model = "cheap"
base_url = "http://localhost:1234/v1"

[[providers]]
model = "mid"
base_url = "http://localhost:1235/v1"

[[providers]]
model = "premium"
base_url = "http://localhost:1236/v1"

[[providers]]
model = "arbiter"
base_url = "http://localhost:1237/v1"

[pricing]
"cheap" = 0.5
"mid" = 5.0
"premium" = 20.0
"arbiter" = 45.0

[tasks.classification]
mode = "fixed"
model = "cheap"

[tasks.website_analysis]
mode = "tiered"
tiers = [
  { threshold = 0, model = "cheap" },
  { threshold = 50000, model = "mid" },
  { threshold = 100000, model = "premium" },
]

[tasks.email_generation]
mode = "judged"
models = ["mid", "premium"]
judge_model = "arbiter"
criteria = ["personalization", "clarity", "tone"]
"#;

fn bench_route_resolution(c: &mut Criterion) {
    let config = Config::from_str(BENCH_CONFIG).expect("should parse config");
    let router = TaskRouter::new(config.task_rules());

    let cases = vec![
        ("fixed", "classification", None),
        ("tiered_low", "website_analysis", Some(1_000.0)),
        ("tiered_high", "website_analysis", Some(250_000.0)),
        ("judged", "email_generation", None),
    ];

    let mut group = c.benchmark_group("route_resolution");
    for (name, task, value) in cases {
        let task_type = TaskType::from(task);
        let mut context = RoutingContext::new();
        if let Some(v) = value {
            context = context.with_estimated_value(v);
        }
        group.bench_with_input(BenchmarkId::from_parameter(name), &(), |b, ()| {
            b.iter(|| router.route(&task_type, &context).expect("should route"));
        });
    }
    group.finish();
}

fn bench_config_parsing(c: &mut Criterion) {
    c.bench_function("config_parse_and_validate", |b| {
        b.iter(|| Config::from_str(BENCH_CONFIG).expect("should parse config"));
    });
}

criterion_group!(benches, bench_route_resolution, bench_config_parsing);
criterion_main!(benches);
