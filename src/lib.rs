//! Conclave - Council-based multi-model LLM task router
//!
//! This library routes units of generation work to one or more LLM backends
//! according to declarative per-task rules, fans judged tasks out to a small
//! council of models, and selects a winner with a judge model.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod judge;
pub mod logger;
pub mod metrics;
pub mod middleware;
pub mod pricing;
pub mod provider;
pub mod router;
pub mod telemetry;
