//! Routing logic for Conclave
//!
//! Maps a (task type, routing context) pair to an execution plan using the
//! declarative per-task rule table loaded from configuration. Routing is a
//! pure function of its inputs and the immutable rule table: identical
//! inputs always produce identical plans within one process lifetime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, AppResult};

/// Opaque name for a provider+model pair (e.g. "claude-sonnet-4")
///
/// Referential integrity is enforced at configuration-load time: every
/// ModelId referenced by a routing rule must resolve in both the pricing
/// table and the provider registry. An unknown id is a configuration
/// error, never a per-request failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label identifying the kind of generation work requested
///
/// Task types are defined by the `[tasks]` configuration table, not by a
/// compile-time enum, so operators can add task types without touching
/// router code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied context consulted by value-tiered routing rules
///
/// Unknown fields are preserved but ignored unless a rule references them.
/// Transient - exists only for the duration of one routing decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Estimated monetary value of the work unit (e.g. lead value in USD).
    /// Absent or zero selects the lowest tier of a tiered rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,

    /// Additional caller fields, carried through untouched.
    #[serde(flatten, default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RoutingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the estimated value
    pub fn with_estimated_value(mut self, value: f64) -> Self {
        self.estimated_value = Some(value);
        self
    }
}

/// One step of a value-tiered routing rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueTier {
    /// Minimum estimated value (inclusive) at which this tier applies
    pub threshold: f64,
    /// Model selected for this tier
    pub model: ModelId,
}

/// Declarative routing rule for one task type
///
/// A tagged union consulted by one generic routing function; adding a task
/// type or changing a threshold is a configuration change, never a code
/// change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RoutingRule {
    /// Always route to a single fixed model
    Fixed { model: ModelId },
    /// Route by `estimated_value` against ascending thresholds
    Tiered { tiers: Vec<ValueTier> },
    /// Fan out to a small council of models and judge the results
    Judged {
        models: Vec<ModelId>,
        judge_model: ModelId,
        criteria: Vec<String>,
    },
}

impl RoutingRule {
    /// All models this rule can select, including the judge model for
    /// judged rules. Used for startup referential-integrity checks.
    pub fn referenced_models(&self) -> Vec<&ModelId> {
        match self {
            Self::Fixed { model } => vec![model],
            Self::Tiered { tiers } => tiers.iter().map(|t| &t.model).collect(),
            Self::Judged {
                models,
                judge_model,
                ..
            } => {
                let mut all: Vec<&ModelId> = models.iter().collect();
                all.push(judge_model);
                all
            }
        }
    }

    /// True if this rule resolves to a single-model plan
    pub fn is_single_model(&self) -> bool {
        !matches!(self, Self::Judged { .. })
    }
}

/// The router's output: which models to invoke and whether to judge
///
/// Invariant: `requires_judge == true` implies at least two models (and a
/// judge model); `requires_judge == false` implies exactly one model.
/// Construction goes through `single()` / `judged()` so the invariant
/// cannot be violated. Consumed immediately by the execution coordinator;
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    task_type: TaskType,
    models: Vec<ModelId>,
    requires_judge: bool,
    judge_model: Option<ModelId>,
    criteria: Vec<String>,
}

impl ExecutionPlan {
    /// Create a single-model plan (no judging)
    pub fn single(task_type: TaskType, model: ModelId) -> Self {
        Self {
            task_type,
            models: vec![model],
            requires_judge: false,
            judge_model: None,
            criteria: Vec::new(),
        }
    }

    /// Create a judged council plan
    ///
    /// # Errors
    /// Returns `AppError::Config` if fewer than two council models are
    /// given. Config validation rejects this at startup, so hitting it
    /// here indicates a bug.
    pub fn judged(
        task_type: TaskType,
        models: Vec<ModelId>,
        judge_model: ModelId,
        criteria: Vec<String>,
    ) -> AppResult<Self> {
        if models.len() < 2 {
            return Err(AppError::Config(format!(
                "Judged plan for task '{}' requires at least 2 council models, got {}",
                task_type,
                models.len()
            )));
        }
        Ok(Self {
            task_type,
            models,
            requires_judge: true,
            judge_model: Some(judge_model),
            criteria,
        })
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    /// Ordered, non-empty list of models to invoke
    pub fn models(&self) -> &[ModelId] {
        &self.models
    }

    pub fn requires_judge(&self) -> bool {
        self.requires_judge
    }

    /// Judge model for council plans; `None` for single-model plans
    pub fn judge_model(&self) -> Option<&ModelId> {
        self.judge_model.as_ref()
    }

    /// Task-type-specific evaluation criteria handed to the judge
    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }
}

/// Deterministic task router over the declarative rule table
///
/// The rule table is an immutable snapshot taken at construction; concurrent
/// routing decisions read it without locking.
#[derive(Debug, Clone)]
pub struct TaskRouter {
    rules: Arc<HashMap<TaskType, RoutingRule>>,
}

impl TaskRouter {
    /// Build a router from a validated rule table
    pub fn new(rules: HashMap<TaskType, RoutingRule>) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Resolve an execution plan for a task
    ///
    /// # Errors
    /// Returns `AppError::UnknownTaskType` if no rule is configured for
    /// `task_type`. This is a caller error and is never retried.
    pub fn route(&self, task_type: &TaskType, context: &RoutingContext) -> AppResult<ExecutionPlan> {
        let rule = self
            .rules
            .get(task_type)
            .ok_or_else(|| AppError::UnknownTaskType {
                task_type: task_type.to_string(),
            })?;

        let plan = match rule {
            RoutingRule::Fixed { model } => {
                ExecutionPlan::single(task_type.clone(), model.clone())
            }
            RoutingRule::Tiered { tiers } => {
                let model = Self::select_tier(tiers, context.estimated_value).ok_or_else(|| {
                    AppError::Config(format!("Task '{}' has a tiered rule with no tiers", task_type))
                })?;
                ExecutionPlan::single(task_type.clone(), model.clone())
            }
            RoutingRule::Judged {
                models,
                judge_model,
                criteria,
            } => ExecutionPlan::judged(
                task_type.clone(),
                models.clone(),
                judge_model.clone(),
                criteria.clone(),
            )?,
        };

        tracing::debug!(
            task_type = %task_type,
            models = ?plan.models(),
            requires_judge = plan.requires_judge(),
            estimated_value = ?context.estimated_value,
            "Routing decision made"
        );

        Ok(plan)
    }

    /// Select the highest tier whose threshold the value meets or exceeds
    ///
    /// Thresholds are validated as strictly ascending at config load, so a
    /// linear scan that remembers the last matching tier is correct. The
    /// boundary is inclusive: a value of exactly 50_000 selects the
    /// 50_000 tier. An absent or zero value selects the lowest tier.
    /// Returns `None` only for an empty tier list, which config validation
    /// rejects at startup.
    fn select_tier(tiers: &[ValueTier], estimated_value: Option<f64>) -> Option<&ModelId> {
        let value = estimated_value.unwrap_or(0.0);
        let mut selected = &tiers.first()?.model;
        for tier in tiers {
            if value >= tier.threshold {
                selected = &tier.model;
            } else {
                break;
            }
        }
        Some(selected)
    }

    /// Number of configured task types
    pub fn task_count(&self) -> usize {
        self.rules.len()
    }
}
