//! Pipeline stage types
//!
//! A training loop iteration walks the six working stages in a fixed order.
//! `Idle` is both the initial and the terminal state of a run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the loop controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Not running a stage (before the first and after the last)
    Idle,
    /// Gathering feedback signals
    Collecting,
    /// Turning signals into training data
    Curating,
    /// Producing a candidate configuration
    Optimizing,
    /// Scoring the candidate against the baseline
    Evaluating,
    /// Progressive rollout of the candidate
    Deploying,
    /// Watching for post-deployment regression
    Monitoring,
}

impl Stage {
    /// The working stages of one iteration, in execution order
    pub const PIPELINE: [Stage; 6] = [
        Stage::Collecting,
        Stage::Curating,
        Stage::Optimizing,
        Stage::Evaluating,
        Stage::Deploying,
        Stage::Monitoring,
    ];

    /// Lowercase name used in IDs, logs and checkpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Collecting => "collecting",
            Stage::Curating => "curating",
            Stage::Optimizing => "optimizing",
            Stage::Evaluating => "evaluating",
            Stage::Deploying => "deploying",
            Stage::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Completed => "completed",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
