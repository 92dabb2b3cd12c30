//! Asynchronous performance logging
//!
//! One immutable record per completed task flows through a bounded queue to
//! a supervised worker that appends to an external store (a JSONL file by
//! default). `log()` never blocks and never fails the caller: a full queue
//! drops the record and counts the drop, because losing one performance
//! record must never cause the business operation to fail or retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::judge::JudgeVerdict;
use crate::metrics::Metrics;
use crate::router::{ModelId, TaskType};

/// The durable outcome of one completed task
///
/// Append-only: records are never mutated or deleted by this subsystem.
/// `correlation_id` is caller-supplied so external systems can later join
/// business outcomes without this core knowing about them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub task_type: TaskType,
    pub model_used: ModelId,
    /// USD spent on the winning candidate
    pub cost: f64,
    /// Total USD attributed to this task: winner + discarded candidates
    /// + the judge call
    pub total_cost: f64,
    /// USD spent on the judge call (0 for unjudged tasks)
    pub judge_cost: f64,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<JudgeVerdict>,
    pub recorded_at: DateTime<Utc>,
    pub correlation_id: String,
}

/// Destination for performance records
///
/// The worker holds the only reference; sink failures are contained to the
/// worker and surfaced through metrics and logs.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    async fn append(&self, record: &PerformanceRecord) -> std::io::Result<()>;
}

/// Appends one JSON object per line to a file
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn append(&self, record: &PerformanceRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// Fire-and-forget handle feeding the log worker
///
/// Cloneable; all clones share the same bounded queue.
#[derive(Clone)]
pub struct PerformanceLogger {
    tx: mpsc::Sender<PerformanceRecord>,
    metrics: Arc<Metrics>,
}

impl PerformanceLogger {
    /// Start the worker task and return the logging handle
    ///
    /// Must be called from within a tokio runtime. The worker drains the
    /// queue for the life of the process; a sink failure drops that one
    /// record and keeps draining.
    pub fn spawn(sink: Arc<dyn RecordSink>, queue_capacity: usize, metrics: Arc<Metrics>) -> Self {
        let (tx, mut rx) = mpsc::channel::<PerformanceRecord>(queue_capacity.max(1));

        let worker_metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = sink.append(&record).await {
                    worker_metrics.record_write_failure();
                    tracing::error!(
                        error = %e,
                        correlation_id = %record.correlation_id,
                        task_type = %record.task_type,
                        "Failed to append performance record; record lost"
                    );
                }
            }
            tracing::debug!("Performance log worker shutting down");
        });

        Self { tx, metrics }
    }

    /// Enqueue a record without waiting
    ///
    /// The caller's return path is never delayed by logging: a full queue
    /// or a dead worker drops the record, counts it, and moves on.
    pub fn log(&self, record: PerformanceRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.metrics.record_dropped();
                tracing::warn!(
                    correlation_id = %record.correlation_id,
                    task_type = %record.task_type,
                    "Performance log queue full, dropping record"
                );
            }
            Err(TrySendError::Closed(record)) => {
                self.metrics.record_dropped();
                tracing::error!(
                    correlation_id = %record.correlation_id,
                    "Performance log worker is gone, dropping record"
                );
            }
        }
    }
}
