//! HTTP request handlers for the Conclave API

use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::executor::ExecutionCoordinator;
use crate::judge::Judge;
use crate::logger::{JsonlSink, PerformanceLogger};
use crate::metrics::Metrics;
use crate::pricing::PricingTable;
use crate::provider::ProviderRegistry;
use crate::router::TaskRouter;

pub mod health;
pub mod metrics;
pub mod submit;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers. Everything
/// here is an immutable snapshot taken at startup; concurrent task
/// executions never observe a half-updated routing table.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    router: Arc<TaskRouter>,
    executor: Arc<ExecutionCoordinator>,
    logger: PerformanceLogger,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire up all components from validated configuration
    ///
    /// Builds the provider registry, pricing table, judge, coordinator, and
    /// spawns the performance-log worker. Must be called from within a
    /// tokio runtime.
    pub fn new(config: Config) -> AppResult<Self> {
        let config = Arc::new(config);
        let metrics = Arc::new(
            Metrics::new()
                .map_err(|e| AppError::Internal(format!("Failed to register metrics: {}", e)))?,
        );

        let registry = Arc::new(ProviderRegistry::from_config(&config)?);
        let pricing = PricingTable::from_config(&config);
        let judge = Judge::new(Arc::clone(&registry), pricing.clone());
        let executor = Arc::new(ExecutionCoordinator::new(
            registry,
            pricing,
            judge,
            Arc::clone(&config),
            Arc::clone(&metrics),
        ));
        let router = Arc::new(TaskRouter::new(config.task_rules()));

        let sink = Arc::new(JsonlSink::new(config.logging.path.clone()));
        let logger =
            PerformanceLogger::spawn(sink, config.logging.queue_capacity, Arc::clone(&metrics));

        Ok(Self {
            config,
            router,
            executor,
            logger,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn executor(&self) -> &ExecutionCoordinator {
        &self.executor
    }

    pub fn logger(&self) -> &PerformanceLogger {
        &self.logger
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
