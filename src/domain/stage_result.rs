//! Immutable record of one stage attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::Metrics;
use super::stage::{Stage, StageStatus};

/// Audit record appended to the run history after every stage attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage that ran
    pub stage: Stage,
    /// How the attempt ended
    pub status: StageStatus,
    /// Metrics the stage produced (empty when skipped)
    pub metrics: Metrics,
    /// Wall-clock duration of the attempt
    pub duration_ms: u64,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Iteration the attempt belongs to (1-based)
    pub iteration: u32,
    /// Failure message for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    pub fn completed(stage: Stage, iteration: u32, metrics: Metrics, duration_ms: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            metrics,
            duration_ms,
            timestamp: Utc::now(),
            iteration,
            error: None,
        }
    }

    pub fn skipped(stage: Stage, iteration: u32, duration_ms: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            metrics: Metrics::new(),
            duration_ms,
            timestamp: Utc::now(),
            iteration,
            error: None,
        }
    }

    pub fn failed(
        stage: Stage,
        iteration: u32,
        metrics: Metrics,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            metrics,
            duration_ms,
            timestamp: Utc::now(),
            iteration,
            error: Some(error.into()),
        }
    }

    /// Look up a metric recorded by this attempt
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}
