//! Command-line interface for Conclave
//!
//! Provides argument parsing and subcommand handling for the binary.

use clap::{Parser, Subcommand};

/// Council-based multi-model LLM task router
#[derive(Parser)]
#[command(name = "conclave")]
#[command(version)]
#[command(about = "Council-based multi-model LLM task router with judge selection")]
#[command(
    long_about = "Conclave routes generation tasks to one or more LLM backends using \
    declarative per-task rules (fixed, value-tiered, or judged councils), fans judged \
    tasks out concurrently, and selects a winner with a judge model."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Conclave Configuration
# ======================
#
# Routes generation tasks to model backends using declarative per-task
# rules. Every model named in a rule, fallback, or judge slot must appear
# in both [[providers]] and [pricing]; startup fails otherwise.

[server]
host = "0.0.0.0"
port = 3000
# Per-call deadline applied to every provider call (1-300 seconds)
request_timeout_seconds = 30

# One entry per model backend. base_url must end with /v1; the adapter
# appends /chat/completions. api_key_env names an environment variable
# holding the bearer token (omit for unauthenticated local backends).
[[providers]]
model = "deepseek-v3"
base_url = "https://openrouter.ai/api/v1"
max_tokens = 2048
temperature = 0.3
api_key_env = "OPENROUTER_API_KEY"

[[providers]]
model = "claude-sonnet-4"
base_url = "https://openrouter.ai/api/v1"
max_tokens = 4096
api_key_env = "OPENROUTER_API_KEY"

[[providers]]
model = "gpt-4o"
base_url = "https://openrouter.ai/api/v1"
max_tokens = 4096
api_key_env = "OPENROUTER_API_KEY"

[[providers]]
model = "claude-opus-4"
base_url = "https://openrouter.ai/api/v1"
max_tokens = 2048
api_key_env = "OPENROUTER_API_KEY"

# USD per million tokens (input + output combined)
[pricing]
"deepseek-v3" = 0.9
"claude-sonnet-4" = 9.0
"gpt-4o" = 7.5
"claude-opus-4" = 45.0

# Routing rules. mode = "fixed" | "tiered" | "judged".
[tasks.classification]
mode = "fixed"
model = "deepseek-v3"

# Tiered: ascending thresholds against context.estimated_value; the
# boundary is inclusive (a value of exactly 50000 selects the 50000 tier).
[tasks.website_analysis]
mode = "tiered"
tiers = [
  { threshold = 0, model = "deepseek-v3" },
  { threshold = 50000, model = "claude-sonnet-4" },
]

# Judged: 2-3 council models generate concurrently; the judge model picks
# a winner against the criteria. The judge must not sit on the council.
[tasks.email_generation]
mode = "judged"
models = ["claude-sonnet-4", "gpt-4o"]
judge_model = "claude-opus-4"
criteria = ["personalization", "clarity", "tone"]

# Single-model tasks may retry once against a fallback model.
[fallbacks]
classification = "gpt-4o"

# Per-task deadline overrides in seconds (defaults to
# server.request_timeout_seconds).
[timeouts]
email_generation = 60

[logging]
path = "performance-log.jsonl"
queue_capacity = 1024

[observability]
log_level = "info"
"#
}
