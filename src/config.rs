//! Configuration management for Conclave
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Loading is three-phase: read, parse, validate. Referential integrity
//! between routing rules, the pricing table, and the provider list is
//! checked here, at startup - an unknown model identifier is a fatal
//! configuration error, never a per-request failure.

use crate::router::{ModelId, RoutingRule, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    providers: Vec<ProviderConfig>,
    /// Model id -> USD per million tokens
    pricing: HashMap<String, f64>,
    /// Task type -> routing rule
    tasks: HashMap<String, RoutingRule>,
    /// Task type -> fallback model, consulted once for failed single-model plans
    #[serde(default)]
    fallbacks: HashMap<String, ModelId>,
    /// Task type -> per-call timeout override in seconds
    #[serde(default)]
    timeouts: HashMap<String, u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// One text-generation backend reachable over an OpenAI-compatible API
///
/// Fields are private to enforce invariants. Configuration is loaded via
/// deserialization and validated via Config::validate(); after construction
/// fields cannot be mutated, so validated data remains valid.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    model: ModelId,
    base_url: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
    /// Environment variable holding the bearer token for this backend.
    /// Absent for unauthenticated local backends.
    #[serde(default)]
    api_key_env: Option<String>,
}

impl ProviderConfig {
    /// Get the model identifier served by this backend
    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// Get the backend base URL (validated to end with /v1)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the default completion budget for this backend
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Get the default sampling temperature for this backend
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Get the name of the environment variable carrying the API key
    pub fn api_key_env(&self) -> Option<&str> {
        self.api_key_env.as_deref()
    }
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

/// Performance-log queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSONL file the performance-record worker appends to
    pub path: PathBuf,
    /// Bounded queue depth between task execution and the log worker.
    /// When full, records are dropped (counted), never blocking callers.
    pub queue_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("performance-log.jsonl"),
            queue_capacity: 1024,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            crate::error::AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| crate::error::AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Configured provider backends
    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Raw pricing table (model id -> USD per million tokens)
    pub fn pricing(&self) -> &HashMap<String, f64> {
        &self.pricing
    }

    /// Routing rule table keyed by task type
    pub fn task_rules(&self) -> HashMap<TaskType, RoutingRule> {
        self.tasks
            .iter()
            .map(|(name, rule)| (TaskType::new(name.clone()), rule.clone()))
            .collect()
    }

    /// Fallback model for a task type, if one is configured
    pub fn fallback_for(&self, task_type: &TaskType) -> Option<&ModelId> {
        self.fallbacks.get(task_type.as_str())
    }

    /// Get the per-call timeout for a task type
    ///
    /// Returns the per-task override if configured, otherwise falls back to
    /// the global `server.request_timeout_seconds`.
    pub fn timeout_for_task(&self, task_type: &TaskType) -> u64 {
        match self.timeouts.get(task_type.as_str()) {
            Some(timeout) => {
                tracing::debug!(
                    task_type = %task_type,
                    timeout_seconds = timeout,
                    "Using task-specific timeout override"
                );
                *timeout
            }
            None => self.server.request_timeout_seconds,
        }
    }

    /// True if `model` resolves in both the provider list and pricing table
    fn known_model(&self, model: &ModelId) -> bool {
        self.providers.iter().any(|p| p.model() == model)
            && self.pricing.contains_key(model.as_str())
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> crate::error::AppResult<()> {
        use crate::error::AppError;

        // Server timeout bounds
        if self.server.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.server.request_timeout_seconds > 300 {
            return Err(AppError::Config(format!(
                "request_timeout_seconds cannot exceed 300 seconds (5 minutes), got {}",
                self.server.request_timeout_seconds
            )));
        }

        // Provider backends
        if self.providers.is_empty() {
            return Err(AppError::Config(
                "No providers configured. Add at least one [[providers]] entry.".to_string(),
            ));
        }
        let mut seen_models = HashSet::new();
        for provider in &self.providers {
            if !seen_models.insert(provider.model().as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate provider entry for model '{}'",
                    provider.model()
                )));
            }
            if !provider.base_url.starts_with("http://")
                && !provider.base_url.starts_with("https://")
            {
                return Err(AppError::Config(format!(
                    "Provider '{}' has invalid base_url '{}'. \
                    base_url must start with 'http://' or 'https://'.",
                    provider.model(),
                    provider.base_url
                )));
            }
            if !provider.base_url.ends_with("/v1") {
                return Err(AppError::Config(format!(
                    "Provider '{}' has invalid base_url '{}'. \
                    base_url must end with '/v1' (e.g., 'https://host/v1') so the \
                    adapter can append '/chat/completions'.",
                    provider.model(),
                    provider.base_url
                )));
            }
            if provider.max_tokens == 0 {
                return Err(AppError::Config(format!(
                    "Provider '{}' has max_tokens=0. max_tokens must be greater than 0.",
                    provider.model()
                )));
            }
            if provider.temperature < 0.0
                || provider.temperature > 2.0
                || !provider.temperature.is_finite()
            {
                return Err(AppError::Config(format!(
                    "Provider '{}' has invalid temperature {}. \
                    temperature must be a finite number between 0.0 and 2.0.",
                    provider.model(),
                    provider.temperature
                )));
            }
        }

        // Pricing table
        for (model, rate) in &self.pricing {
            if !rate.is_finite() || *rate < 0.0 {
                return Err(AppError::Config(format!(
                    "Pricing for model '{}' is invalid ({}). \
                    Rates must be non-negative finite USD per million tokens.",
                    model, rate
                )));
            }
        }

        // Routing rules and their referential integrity
        if self.tasks.is_empty() {
            return Err(AppError::Config(
                "No task types configured. Add at least one [tasks.<name>] rule.".to_string(),
            ));
        }
        for (task_name, rule) in &self.tasks {
            match rule {
                RoutingRule::Fixed { .. } => {}
                RoutingRule::Tiered { tiers } => {
                    if tiers.is_empty() {
                        return Err(AppError::Config(format!(
                            "Task '{}' has a tiered rule with no tiers",
                            task_name
                        )));
                    }
                    let mut previous: Option<f64> = None;
                    for tier in tiers {
                        if !tier.threshold.is_finite() || tier.threshold < 0.0 {
                            return Err(AppError::Config(format!(
                                "Task '{}' has an invalid tier threshold {}",
                                task_name, tier.threshold
                            )));
                        }
                        if let Some(prev) = previous {
                            if tier.threshold <= prev {
                                return Err(AppError::Config(format!(
                                    "Task '{}' tier thresholds must be strictly ascending \
                                    ({} follows {})",
                                    task_name, tier.threshold, prev
                                )));
                            }
                        }
                        previous = Some(tier.threshold);
                    }
                }
                RoutingRule::Judged {
                    models,
                    judge_model,
                    criteria,
                } => {
                    if models.len() < 2 || models.len() > 3 {
                        return Err(AppError::Config(format!(
                            "Task '{}' council must list 2-3 models, got {}",
                            task_name,
                            models.len()
                        )));
                    }
                    let distinct: HashSet<&str> = models.iter().map(ModelId::as_str).collect();
                    if distinct.len() != models.len() {
                        return Err(AppError::Config(format!(
                            "Task '{}' council lists the same model more than once",
                            task_name
                        )));
                    }
                    if models.contains(judge_model) {
                        return Err(AppError::Config(format!(
                            "Task '{}' uses judge model '{}' as a council member. \
                            The judge must not evaluate its own candidate.",
                            task_name, judge_model
                        )));
                    }
                    if criteria.is_empty() {
                        return Err(AppError::Config(format!(
                            "Task '{}' is judged but lists no evaluation criteria",
                            task_name
                        )));
                    }
                }
            }

            for model in rule.referenced_models() {
                if !self.known_model(model) {
                    return Err(AppError::Config(format!(
                        "Task '{}' references model '{}' which is missing from \
                        [[providers]] and/or [pricing]. Every routed model must \
                        resolve in both at startup.",
                        task_name, model
                    )));
                }
            }
        }

        // Fallbacks apply to single-model plans only
        for (task_name, fallback) in &self.fallbacks {
            let rule = self.tasks.get(task_name).ok_or_else(|| {
                AppError::Config(format!(
                    "Fallback configured for unknown task '{}'",
                    task_name
                ))
            })?;
            if !rule.is_single_model() {
                return Err(AppError::Config(format!(
                    "Fallback configured for judged task '{}'. Council plans \
                    tolerate member failures and do not use fallbacks.",
                    task_name
                )));
            }
            if !self.known_model(fallback) {
                return Err(AppError::Config(format!(
                    "Fallback model '{}' for task '{}' is missing from \
                    [[providers]] and/or [pricing]",
                    fallback, task_name
                )));
            }
        }

        // Per-task timeout overrides
        for (task_name, timeout) in &self.timeouts {
            if !self.tasks.contains_key(task_name) {
                return Err(AppError::Config(format!(
                    "Timeout override configured for unknown task '{}'",
                    task_name
                )));
            }
            if *timeout == 0 || *timeout > 300 {
                return Err(AppError::Config(format!(
                    "timeouts.{} must be in the range 1..=300 seconds, got {}",
                    task_name, timeout
                )));
            }
        }

        if self.logging.queue_capacity == 0 {
            return Err(AppError::Config(
                "logging.queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = crate::error::AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(toml_str).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            }
        })?;

        // Validate config before returning
        config.validate()?;
        Ok(config)
    }
}
