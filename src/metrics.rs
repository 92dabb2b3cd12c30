//! Prometheus metrics collection for Conclave
//!
//! Tracks task throughput by task type and plan mode, task latency,
//! per-model candidate failures, judge fallbacks, and performance-log
//! drops. Exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Plan mode label for metrics
///
/// Restricting the label to two compile-time values prevents cardinality
/// explosion from free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Single-model plan (fixed or tiered rule)
    Single,
    /// Multi-candidate council plan
    Council,
}

impl PlanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Council => "council",
        }
    }
}

/// Metrics collector for Conclave
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    tasks_total: IntCounterVec,
    task_duration: HistogramVec,
    candidate_failures: IntCounterVec,
    judge_fallbacks: IntCounter,
    records_dropped: IntCounter,
    record_write_failures: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_total = IntCounterVec::new(
            Opts::new("conclave_tasks_total", "Completed tasks by task type and plan mode"),
            &["task_type", "mode"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new(
                "conclave_task_duration_seconds",
                "End-to-end task latency by plan mode",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["mode"],
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        let candidate_failures = IntCounterVec::new(
            Opts::new(
                "conclave_candidate_failures_total",
                "Failed provider calls by model",
            ),
            &["model"],
        )?;
        registry.register(Box::new(candidate_failures.clone()))?;

        let judge_fallbacks = IntCounter::new(
            "conclave_judge_fallbacks_total",
            "Judged tasks resolved by the deterministic tie-break",
        )?;
        registry.register(Box::new(judge_fallbacks.clone()))?;

        let records_dropped = IntCounter::new(
            "conclave_records_dropped_total",
            "Performance records dropped because the log queue was full or closed",
        )?;
        registry.register(Box::new(records_dropped.clone()))?;

        let record_write_failures = IntCounter::new(
            "conclave_record_write_failures_total",
            "Performance records lost to sink write failures",
        )?;
        registry.register(Box::new(record_write_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            tasks_total,
            task_duration,
            candidate_failures,
            judge_fallbacks,
            records_dropped,
            record_write_failures,
        })
    }

    pub fn task_completed(&self, task_type: &str, mode: PlanMode) {
        self.tasks_total
            .with_label_values(&[task_type, mode.as_str()])
            .inc();
    }

    pub fn observe_task_duration(&self, mode: PlanMode, seconds: f64) {
        self.task_duration
            .with_label_values(&[mode.as_str()])
            .observe(seconds);
    }

    pub fn candidate_failure(&self, model: &str) {
        self.candidate_failures.with_label_values(&[model]).inc();
    }

    pub fn judge_fallback(&self) {
        self.judge_fallbacks.inc();
    }

    pub fn record_dropped(&self) {
        self.records_dropped.inc();
    }

    pub fn record_write_failure(&self) {
        self.record_write_failures.inc();
    }

    /// Total records lost (queue drops + sink failures), surfaced in /health
    pub fn records_lost_count(&self) -> u64 {
        self.records_dropped.get() + self.record_write_failures.get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output was not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_collision() {
        let metrics = Metrics::new().expect("should build metrics");
        metrics.task_completed("classification", PlanMode::Single);
        metrics.task_completed("email_generation", PlanMode::Council);
        metrics.observe_task_duration(PlanMode::Council, 2.5);
        metrics.candidate_failure("claude-sonnet-4");
        metrics.judge_fallback();

        let output = metrics.gather().expect("should gather");
        assert!(output.contains("conclave_tasks_total"));
        assert!(output.contains("mode=\"council\""));
        assert!(output.contains("conclave_candidate_failures_total"));
        assert!(output.contains("conclave_judge_fallbacks_total 1"));
    }

    #[test]
    fn test_records_lost_count_sums_drop_sources() {
        let metrics = Metrics::new().expect("should build metrics");
        assert_eq!(metrics.records_lost_count(), 0);

        metrics.record_dropped();
        metrics.record_write_failure();
        metrics.record_write_failure();
        assert_eq!(metrics.records_lost_count(), 3);
    }

    #[test]
    fn test_plan_mode_labels() {
        assert_eq!(PlanMode::Single.as_str(), "single");
        assert_eq!(PlanMode::Council.as_str(), "council");
    }
}
