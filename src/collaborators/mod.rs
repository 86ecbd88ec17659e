//! External collaborator contracts
//!
//! The loop controller only orchestrates. Signal collection, curation,
//! optimization, regression detection, durability and the two child
//! workflows are implemented elsewhere and reached through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{Metrics, OptimizationStrategy, Stage, TimeWindow};
use crate::error::Result;

pub mod scripted;

pub use scripted::{Scenario, ScriptedCollaborators};

/// Raw feedback signals gathered for a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedSignals {
    pub count: u64,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// Constraints handed to the curator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationConstraints {
    pub min_quality: f64,
    pub max_samples: u32,
    pub balance_classes: bool,
}

impl Default for CurationConstraints {
    fn default() -> Self {
        Self {
            min_quality: 0.7,
            max_samples: 500,
            balance_classes: true,
        }
    }
}

/// Training data produced by the curator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CuratedData {
    pub examples: Vec<serde_json::Value>,
    pub quality_score: f64,
}

/// Candidate produced by the optimizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub candidate_score: f64,
}

/// Regression check over recent traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionStatus {
    pub has_regression: bool,
}

/// In-process collaborators called by the collect, curate, optimize and monitor stages
#[async_trait]
pub trait Collaborators: Send + Sync {
    async fn collect_signals(
        &self,
        project_id: &str,
        window: &TimeWindow,
        signal_types: &[String],
    ) -> Result<CollectedSignals>;

    async fn curate_training_data(
        &self,
        raw: &CollectedSignals,
        constraints: &CurationConstraints,
    ) -> Result<CuratedData>;

    async fn run_optimization(
        &self,
        curated: &CuratedData,
        strategy: OptimizationStrategy,
        prompt_id: &str,
    ) -> Result<OptimizationOutcome>;

    async fn check_regression_status(&self, suite_id: &str, sample_size: u32) -> Result<RegressionStatus>;
}

/// Durability checkpoint written after every stage attempt
#[async_trait]
pub trait IterationRecorder: Send + Sync {
    async fn record_loop_iteration(&self, loop_id: &str, stage: Stage, metrics: &Metrics) -> Result<()>;
}

/// A deployable agent version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub agent_id: String,
    pub version: String,
}

/// Input of the evaluation-run child workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationParams {
    pub project_id: String,
    pub agent_id: String,
    pub agent_version: String,
    pub dataset: String,
    pub scorers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub avg_score: f64,
}

/// Terminal result of the evaluation-run child workflow
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub summary: EvaluationSummary,
}

/// Input of the progressive-rollout child workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutParams {
    pub current_agent: AgentRef,
    pub new_agent: AgentRef,
    pub dataset: String,
    pub scorers: Vec<String>,
    /// Traffic percentage per rollout stage
    pub stages: Vec<u32>,
    pub min_score: f64,
    pub stage_duration_secs: u64,
}

/// Terminal result of the progressive-rollout child workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutOutcome {
    pub completed: bool,
    pub final_stage: u32,
}

/// Independently identified sub-workflows spawned by the evaluate and deploy stages
///
/// Implementations should stop work promptly once `cancel` fires.
#[async_trait]
pub trait ChildWorkflows: Send + Sync {
    async fn evaluation_run(
        &self,
        child_id: &str,
        params: EvaluationParams,
        cancel: CancellationToken,
    ) -> Result<EvaluationOutcome>;

    async fn progressive_rollout(
        &self,
        child_id: &str,
        params: RolloutParams,
        cancel: CancellationToken,
    ) -> Result<RolloutOutcome>;
}
