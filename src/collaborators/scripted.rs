//! Scripted collaborator backend
//!
//! Plays back a `Scenario`: one value per successful call for every
//! collaborator, with the last value repeating once a list runs out. Used by
//! the CLI for dry runs and by the tests as the default backend.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{
    ChildWorkflows, CollectedSignals, Collaborators, CuratedData, CurationConstraints,
    EvaluationOutcome, EvaluationParams, EvaluationSummary, IterationRecorder,
    OptimizationOutcome, RegressionStatus, RolloutOutcome, RolloutParams,
};
use crate::domain::{Metrics, OptimizationStrategy, Stage, TimeWindow};
use crate::error::{ImprovrError, Result};

/// Scripted collaborator responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Scenario {
    pub signal_counts: Vec<u64>,
    pub quality_scores: Vec<f64>,
    pub curated_counts: Vec<u64>,
    pub candidate_scores: Vec<f64>,
    pub eval_scores: Vec<f64>,
    pub rollout_completed: Vec<bool>,
    pub regressions: Vec<bool>,
    /// Leading transient failures per stage before calls start succeeding
    pub transient_failures: HashMap<Stage, u32>,
    /// Artificial latency of every call
    pub delay_ms: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            signal_counts: vec![120],
            quality_scores: vec![0.85],
            curated_counts: vec![100],
            candidate_scores: vec![0.82],
            eval_scores: vec![0.8],
            rollout_completed: vec![true],
            regressions: vec![false],
            transient_failures: HashMap::new(),
            delay_ms: 0,
        }
    }
}

/// A durability checkpoint captured by the scripted recorder
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCheckpoint {
    pub loop_id: String,
    pub stage: Stage,
    pub metrics: Metrics,
}

fn pick<T: Copy>(values: &[T], index: usize, fallback: T) -> T {
    values.get(index).or(values.last()).copied().unwrap_or(fallback)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Collaborator backend driven by a `Scenario`
#[derive(Debug, Default)]
pub struct ScriptedCollaborators {
    scenario: Scenario,
    attempts: Mutex<HashMap<Stage, u32>>,
    calls: Mutex<HashMap<Stage, usize>>,
    checkpoints: Mutex<Vec<RecordedCheckpoint>>,
    child_ids: Mutex<Vec<String>>,
}

impl ScriptedCollaborators {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            ..Self::default()
        }
    }

    /// Successful calls made for a stage
    pub fn call_count(&self, stage: Stage) -> usize {
        lock(&self.calls).get(&stage).copied().unwrap_or(0)
    }

    /// All calls made for a stage, failed ones included
    pub fn attempt_count(&self, stage: Stage) -> u32 {
        lock(&self.attempts).get(&stage).copied().unwrap_or(0)
    }

    pub fn checkpoints(&self) -> Vec<RecordedCheckpoint> {
        lock(&self.checkpoints).clone()
    }

    /// IDs of every child workflow started, in order
    pub fn child_ids(&self) -> Vec<String> {
        lock(&self.child_ids).clone()
    }

    /// Register a call, failing it while scripted outages remain
    fn next_call(&self, stage: Stage) -> Result<usize> {
        let attempt = {
            let mut attempts = lock(&self.attempts);
            let entry = attempts.entry(stage).or_insert(0);
            *entry += 1;
            *entry
        };

        let outages = self.scenario.transient_failures.get(&stage).copied().unwrap_or(0);
        if attempt <= outages {
            return Err(ImprovrError::Transient(format!(
                "scripted {} outage (attempt {})",
                stage, attempt
            )));
        }

        let mut calls = lock(&self.calls);
        let entry = calls.entry(stage).or_insert(0);
        let index = *entry;
        *entry += 1;
        Ok(index)
    }

    async fn simulate_latency(&self) {
        if self.scenario.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.scenario.delay_ms)).await;
        }
    }

    async fn child_latency(&self, child_id: &str, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ImprovrError::Terminated(child_id.to_string())),
            _ = self.simulate_latency() => Ok(()),
        }
    }
}

#[async_trait]
impl Collaborators for ScriptedCollaborators {
    async fn collect_signals(
        &self,
        _project_id: &str,
        _window: &TimeWindow,
        _signal_types: &[String],
    ) -> Result<CollectedSignals> {
        let index = self.next_call(Stage::Collecting)?;
        self.simulate_latency().await;
        Ok(CollectedSignals {
            count: pick(&self.scenario.signal_counts, index, 0),
            items: Vec::new(),
        })
    }

    async fn curate_training_data(
        &self,
        _raw: &CollectedSignals,
        _constraints: &CurationConstraints,
    ) -> Result<CuratedData> {
        let index = self.next_call(Stage::Curating)?;
        self.simulate_latency().await;
        let count = pick(&self.scenario.curated_counts, index, 0);
        Ok(CuratedData {
            examples: (0..count).map(|i| serde_json::json!({ "example": i })).collect(),
            quality_score: pick(&self.scenario.quality_scores, index, 0.0),
        })
    }

    async fn run_optimization(
        &self,
        _curated: &CuratedData,
        _strategy: OptimizationStrategy,
        _prompt_id: &str,
    ) -> Result<OptimizationOutcome> {
        let index = self.next_call(Stage::Optimizing)?;
        self.simulate_latency().await;
        Ok(OptimizationOutcome {
            candidate_score: pick(&self.scenario.candidate_scores, index, 0.0),
        })
    }

    async fn check_regression_status(&self, _suite_id: &str, _sample_size: u32) -> Result<RegressionStatus> {
        let index = self.next_call(Stage::Monitoring)?;
        self.simulate_latency().await;
        Ok(RegressionStatus {
            has_regression: pick(&self.scenario.regressions, index, false),
        })
    }
}

#[async_trait]
impl IterationRecorder for ScriptedCollaborators {
    async fn record_loop_iteration(&self, loop_id: &str, stage: Stage, metrics: &Metrics) -> Result<()> {
        lock(&self.checkpoints).push(RecordedCheckpoint {
            loop_id: loop_id.to_string(),
            stage,
            metrics: metrics.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl ChildWorkflows for ScriptedCollaborators {
    async fn evaluation_run(
        &self,
        child_id: &str,
        _params: EvaluationParams,
        cancel: CancellationToken,
    ) -> Result<EvaluationOutcome> {
        lock(&self.child_ids).push(child_id.to_string());
        let index = self.next_call(Stage::Evaluating)?;
        self.child_latency(child_id, &cancel).await?;
        Ok(EvaluationOutcome {
            summary: EvaluationSummary {
                avg_score: pick(&self.scenario.eval_scores, index, 0.0),
            },
        })
    }

    async fn progressive_rollout(
        &self,
        child_id: &str,
        params: RolloutParams,
        cancel: CancellationToken,
    ) -> Result<RolloutOutcome> {
        lock(&self.child_ids).push(child_id.to_string());
        let index = self.next_call(Stage::Deploying)?;
        self.child_latency(child_id, &cancel).await?;
        let completed = pick(&self.scenario.rollout_completed, index, true);
        Ok(RolloutOutcome {
            completed,
            final_stage: if completed { params.stages.len() as u32 } else { 1 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_repeats_last_value() {
        assert_eq!(pick(&[1, 2], 0, 9), 1);
        assert_eq!(pick(&[1, 2], 5, 9), 2);
        assert_eq!(pick::<u32>(&[], 0, 9), 9);
    }

    #[test]
    fn test_scenario_from_yaml_uses_defaults() {
        let yaml = "quality-scores: [0.5]\ntransient-failures:\n  collecting: 2\n";
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.quality_scores, vec![0.5]);
        assert_eq!(scenario.eval_scores, vec![0.8]);
        assert_eq!(scenario.transient_failures.get(&Stage::Collecting), Some(&2));
    }

    #[tokio::test]
    async fn test_values_advance_per_successful_call() {
        let scenario = Scenario {
            regressions: vec![true, false],
            ..Scenario::default()
        };
        let backend = ScriptedCollaborators::new(scenario);
        assert!(backend.check_regression_status("suite", 10).await.unwrap().has_regression);
        assert!(!backend.check_regression_status("suite", 10).await.unwrap().has_regression);
        assert!(!backend.check_regression_status("suite", 10).await.unwrap().has_regression);
        assert_eq!(backend.call_count(Stage::Monitoring), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_precede_success() {
        let mut scenario = Scenario::default();
        scenario.transient_failures.insert(Stage::Optimizing, 2);
        let backend = ScriptedCollaborators::new(scenario);
        let curated = CuratedData::default();

        for _ in 0..2 {
            let err = backend
                .run_optimization(&curated, OptimizationStrategy::Reflection, "prompt")
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        let outcome = backend
            .run_optimization(&curated, OptimizationStrategy::Reflection, "prompt")
            .await
            .unwrap();
        assert_eq!(outcome.candidate_score, 0.82);
        assert_eq!(backend.attempt_count(Stage::Optimizing), 3);
        assert_eq!(backend.call_count(Stage::Optimizing), 1);
    }

    #[tokio::test]
    async fn test_curated_examples_match_count() {
        let scenario = Scenario {
            curated_counts: vec![3],
            ..Scenario::default()
        };
        let backend = ScriptedCollaborators::new(scenario);
        let data = backend
            .curate_training_data(&CollectedSignals::default(), &CurationConstraints::default())
            .await
            .unwrap();
        assert_eq!(data.examples.len(), 3);
        assert_eq!(data.quality_score, 0.85);
    }

    #[tokio::test]
    async fn test_child_workflow_honours_cancellation() {
        let scenario = Scenario {
            delay_ms: 10_000,
            ..Scenario::default()
        };
        let backend = ScriptedCollaborators::new(scenario);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let params = EvaluationParams {
            project_id: "p".into(),
            agent_id: "a".into(),
            agent_version: "candidate-1".into(),
            dataset: "suite".into(),
            scorers: vec![],
        };
        let err = backend.evaluation_run("child-1", params, cancel).await.unwrap_err();
        assert!(matches!(err, ImprovrError::Terminated(_)));
        assert_eq!(backend.child_ids(), vec!["child-1".to_string()]);
    }

    #[tokio::test]
    async fn test_incomplete_rollout_stops_at_first_stage() {
        let scenario = Scenario {
            rollout_completed: vec![false],
            ..Scenario::default()
        };
        let backend = ScriptedCollaborators::new(scenario);
        let agent = crate::collaborators::AgentRef {
            agent_id: "a".into(),
            version: "v".into(),
        };
        let params = RolloutParams {
            current_agent: agent.clone(),
            new_agent: agent,
            dataset: "suite".into(),
            scorers: vec![],
            stages: vec![10, 50, 100],
            min_score: 0.7,
            stage_duration_secs: 1,
        };
        let outcome = backend
            .progressive_rollout("child-2", params, CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.final_stage, 1);
    }
}
