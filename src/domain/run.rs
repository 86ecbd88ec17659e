//! Mutable state of a single training loop run.
//!
//! `LoopRun` is owned by the loop controller. Control flags live elsewhere
//! (see `coordination::control`); this record carries the data side: stage,
//! iteration counter, metrics, baseline and the append-only history.

use super::metrics::{EVAL_SCORE, Metrics};
use super::stage::{Stage, StageStatus};
use super::stage_result::StageResult;
use super::status::TrainingLoopStatus;
use super::training::{RunStatus, TrainingLoopResult};
use crate::error::{ImprovrError, Result};

#[derive(Debug, Clone)]
pub struct LoopRun {
    pub loop_id: String,
    pub stage: Stage,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub metrics: Metrics,
    baseline_score: Option<f64>,
    history: Vec<StageResult>,
}

impl LoopRun {
    pub fn new(loop_id: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            loop_id: loop_id.into(),
            stage: Stage::Idle,
            current_iteration: 0,
            max_iterations,
            metrics: Metrics::new(),
            baseline_score: None,
            history: Vec::new(),
        }
    }

    /// Whether another iteration fits under the cap
    pub fn has_iterations_left(&self) -> bool {
        self.current_iteration < self.max_iterations
    }

    /// Advance the iteration counter before the first stage of an iteration
    pub fn begin_iteration(&mut self) -> Result<u32> {
        if !self.has_iterations_left() {
            return Err(ImprovrError::InvariantViolation(format!(
                "iteration {} would exceed max_iterations {}",
                self.current_iteration + 1,
                self.max_iterations
            )));
        }
        self.current_iteration += 1;
        Ok(self.current_iteration)
    }

    /// Overwrite metric values with a stage's output
    pub fn merge_metrics(&mut self, metrics: &Metrics) {
        for (name, value) in metrics {
            self.metrics.insert(name.clone(), *value);
        }
    }

    /// Append a stage result to the history
    pub fn record(&mut self, result: StageResult) -> Result<()> {
        let cap = self.max_iterations as usize * Stage::PIPELINE.len();
        if self.history.len() >= cap {
            return Err(ImprovrError::InvariantViolation(format!(
                "history would exceed {} entries",
                cap
            )));
        }
        self.history.push(result);
        Ok(())
    }

    pub fn history(&self) -> &[StageResult] {
        &self.history
    }

    pub fn last_result(&self) -> Option<&StageResult> {
        self.history.last()
    }

    pub fn baseline_score(&self) -> Option<f64> {
        self.baseline_score
    }

    /// Seed the baseline from a known production score
    pub fn seed_baseline(&mut self, score: f64) {
        if self.baseline_score.is_none() && score > 0.0 {
            self.baseline_score = Some(score);
        }
    }

    /// Baseline to compare an evaluation against, set from the first one
    ///
    /// A first evaluation scoring exactly zero falls back to a baseline of 1
    /// so the ratio stays defined.
    pub fn establish_baseline(&mut self, eval_score: f64) -> f64 {
        *self
            .baseline_score
            .get_or_insert(if eval_score == 0.0 { 1.0 } else { eval_score })
    }

    /// Score of the most recent evaluation that completed
    pub fn last_completed_eval_score(&self) -> Option<f64> {
        self.history
            .iter()
            .rev()
            .find(|r| r.stage == Stage::Evaluating && r.status == StageStatus::Completed)
            .and_then(|r| r.metric(EVAL_SCORE))
    }

    /// Relative gain over the baseline, 0 when undefined
    pub fn improvement(&self) -> f64 {
        match (self.last_completed_eval_score(), self.baseline_score) {
            (Some(score), Some(baseline)) if baseline != 0.0 => (score - baseline) / baseline,
            _ => 0.0,
        }
    }

    pub fn has_failure(&self) -> bool {
        self.history.iter().any(StageResult::is_failed)
    }

    /// Overall status: abort wins, then any failed stage, else completed
    pub fn final_status(&self, aborted: bool) -> RunStatus {
        if aborted {
            RunStatus::Aborted
        } else if self.has_failure() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }

    /// Read-only snapshot for pollers (control flags are filled in by the caller)
    pub fn snapshot(&self) -> TrainingLoopStatus {
        TrainingLoopStatus {
            loop_id: self.loop_id.clone(),
            stage: self.stage,
            progress: self.history.len() as f64 / Stage::PIPELINE.len() as f64,
            metrics: self.metrics.clone(),
            history: self.history.clone(),
            is_paused: false,
            is_aborted: false,
            awaiting_approval: false,
            current_iteration: self.current_iteration,
            max_iterations: self.max_iterations,
        }
    }

    /// Freeze the run into its terminal result
    pub fn into_result(self, status: RunStatus, total_duration_ms: u64) -> TrainingLoopResult {
        let improvement = self.improvement();
        TrainingLoopResult {
            loop_id: self.loop_id,
            status,
            stages: self.history,
            improvement,
            total_duration_ms,
            iterations: self.current_iteration,
            baseline_score: self.baseline_score,
            metrics: self.metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_result(score: f64, status: StageStatus) -> StageResult {
        let mut metrics = Metrics::new();
        metrics.insert(EVAL_SCORE.to_string(), score);
        match status {
            StageStatus::Completed => StageResult::completed(Stage::Evaluating, 1, metrics, 1),
            StageStatus::Failed => StageResult::failed(Stage::Evaluating, 1, metrics, 1, "rejected"),
            StageStatus::Skipped => StageResult::skipped(Stage::Evaluating, 1, 1),
        }
    }

    #[test]
    fn test_begin_iteration_enforces_cap() {
        let mut run = LoopRun::new("loop-1", 2);
        assert_eq!(run.begin_iteration().unwrap(), 1);
        assert_eq!(run.begin_iteration().unwrap(), 2);
        assert!(!run.has_iterations_left());
        let err = run.begin_iteration().unwrap_err();
        assert!(matches!(err, ImprovrError::InvariantViolation(_)));
        assert_eq!(run.current_iteration, 2);
    }

    #[test]
    fn test_record_enforces_history_cap() {
        let mut run = LoopRun::new("loop-1", 1);
        for stage in Stage::PIPELINE {
            run.record(StageResult::skipped(stage, 1, 0)).unwrap();
        }
        let err = run.record(StageResult::skipped(Stage::Collecting, 1, 0)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(run.history().len(), 6);
    }

    #[test]
    fn test_baseline_is_set_once() {
        let mut run = LoopRun::new("loop-1", 3);
        assert_eq!(run.establish_baseline(0.8), 0.8);
        assert_eq!(run.establish_baseline(0.9), 0.8);
        assert_eq!(run.baseline_score(), Some(0.8));
    }

    #[test]
    fn test_zero_first_evaluation_falls_back_to_one() {
        let mut run = LoopRun::new("loop-1", 3);
        assert_eq!(run.establish_baseline(0.0), 1.0);
        assert_eq!(run.establish_baseline(0.5), 1.0);
    }

    #[test]
    fn test_seed_baseline_ignores_non_positive() {
        let mut run = LoopRun::new("loop-1", 3);
        run.seed_baseline(0.0);
        assert_eq!(run.baseline_score(), None);
        run.seed_baseline(0.75);
        run.seed_baseline(0.9);
        assert_eq!(run.baseline_score(), Some(0.75));
    }

    #[test]
    fn test_improvement_uses_last_completed_evaluation() {
        let mut run = LoopRun::new("loop-1", 3);
        run.establish_baseline(0.8);
        run.record(eval_result(0.84, StageStatus::Completed)).unwrap();
        run.record(eval_result(0.5, StageStatus::Failed)).unwrap();
        let expected = (0.84 - 0.8) / 0.8;
        assert!((run.improvement() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_improvement_zero_without_completed_evaluation() {
        let mut run = LoopRun::new("loop-1", 3);
        assert_eq!(run.improvement(), 0.0);
        run.establish_baseline(0.8);
        run.record(eval_result(0.5, StageStatus::Failed)).unwrap();
        assert_eq!(run.improvement(), 0.0);
    }

    #[test]
    fn test_final_status_precedence() {
        let mut run = LoopRun::new("loop-1", 3);
        assert_eq!(run.final_status(false), RunStatus::Completed);
        run.record(eval_result(0.5, StageStatus::Failed)).unwrap();
        assert_eq!(run.final_status(false), RunStatus::Failed);
        assert_eq!(run.final_status(true), RunStatus::Aborted);
    }

    #[test]
    fn test_merge_metrics_overwrites() {
        let mut run = LoopRun::new("loop-1", 3);
        let mut first = Metrics::new();
        first.insert(EVAL_SCORE.to_string(), 0.5);
        run.merge_metrics(&first);
        let mut second = Metrics::new();
        second.insert(EVAL_SCORE.to_string(), 0.7);
        run.merge_metrics(&second);
        assert_eq!(run.metrics.get(EVAL_SCORE), Some(&0.7));
    }

    #[test]
    fn test_snapshot_progress() {
        let mut run = LoopRun::new("loop-1", 3);
        run.record(StageResult::skipped(Stage::Collecting, 1, 0)).unwrap();
        run.record(StageResult::skipped(Stage::Curating, 1, 0)).unwrap();
        run.record(StageResult::skipped(Stage::Optimizing, 1, 0)).unwrap();
        let status = run.snapshot();
        assert!((status.progress - 0.5).abs() < f64::EPSILON);
        assert_eq!(status.history.len(), 3);
    }

    #[test]
    fn test_into_result_carries_history() {
        let mut run = LoopRun::new("loop-1", 3);
        run.begin_iteration().unwrap();
        run.record(StageResult::skipped(Stage::Collecting, 1, 0)).unwrap();
        let result = run.into_result(RunStatus::Completed, 42);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.stages.len(), 1);
        assert_eq!(result.total_duration_ms, 42);
    }
}
