//! Uniform stage envelope and the six pipeline stages.
//!
//! Every stage runs through `StageExecutor::execute`: publish the new stage,
//! honour a pending skip, otherwise run the stage body, merge its metrics,
//! write the durability checkpoint and append exactly one `StageResult`.
//! Evaluation defers its approval gate until after the checkpoint, so the
//! scored candidate is durable while a reviewer decides.

use std::sync::Arc;
use std::time::Instant;

use crate::collaborators::{
    AgentRef, ChildWorkflows, Collaborators, CollectedSignals, CuratedData, EvaluationParams,
    IterationRecorder, RolloutParams,
};
use crate::coordination::LoopControl;
use crate::domain::metrics::{
    BASELINE_SCORE, CANDIDATE_SCORE, CURATED_COUNT, EVAL_SCORE, FINAL_STAGE, HAS_REGRESSION,
    QUALITY_SCORE, ROLLOUT_COMPLETED, SAMPLE_SIZE, SCORE_RATIO, SIGNAL_COUNT, flag,
};
use crate::domain::{LoopRun, Metrics, Stage, StageResult, StageStatus, TimeWindow, TrainingLoopInput};
use crate::error::{ImprovrError, Result};
use crate::manager::ChildLauncher;
use crate::runner::retry::retry_with_backoff;
use crate::runner::ControllerConfig;

use super::gate::apply_gate;

/// Version label of the agent currently serving traffic
pub const PRODUCTION_VERSION: &str = "production";

/// Version label of the candidate an iteration produces
pub fn candidate_version(iteration: u32) -> String {
    format!("candidate-{}", iteration)
}

/// Outputs handed from one stage to the next
///
/// A skipped stage leaves the previous output in place; downstream stages
/// fall back to empty defaults when nothing was produced yet.
#[derive(Debug, Default)]
struct Carry {
    signals: Option<CollectedSignals>,
    curated: Option<CuratedData>,
}

/// What is left of a stage once its work is done and checkpointed
#[derive(Debug, Clone, Copy, PartialEq)]
enum Verdict {
    Done,
    Gate { score_ratio: f64 },
}

/// Runs pipeline stages for one loop run
pub struct StageExecutor<'a> {
    collaborators: &'a dyn Collaborators,
    recorder: &'a dyn IterationRecorder,
    launcher: ChildLauncher,
    config: &'a ControllerConfig,
    input: &'a TrainingLoopInput,
    control: &'a LoopControl,
    carry: Carry,
}

impl<'a> StageExecutor<'a> {
    pub fn new(
        collaborators: &'a dyn Collaborators,
        recorder: &'a dyn IterationRecorder,
        workflows: Arc<dyn ChildWorkflows>,
        config: &'a ControllerConfig,
        input: &'a TrainingLoopInput,
        control: &'a LoopControl,
    ) -> Self {
        let launcher = ChildLauncher::new(workflows, control.loop_id(), control.cancel_token());
        Self {
            collaborators,
            recorder,
            launcher,
            config,
            input,
            control,
            carry: Carry::default(),
        }
    }

    /// Run one stage and append its result to the run history
    ///
    /// Business failures come back as `Ok(StageStatus::Failed)`; only fatal
    /// errors (termination, invariant violations) are returned as `Err`.
    pub async fn execute(&mut self, run: &mut LoopRun, stage: Stage) -> Result<StageStatus> {
        let started = Instant::now();
        let iteration = run.current_iteration;
        run.stage = stage;
        self.control.publish(run);

        let result = if self.control.take_skip() {
            tracing::info!(loop_id = %run.loop_id, %stage, iteration, "Stage skipped by operator");
            StageResult::skipped(stage, iteration, elapsed_ms(started))
        } else {
            let mut metrics = Metrics::new();
            let outcome = match self.attempt(run, stage, &mut metrics).await {
                Err(e) if e.is_fatal() => return Err(e),
                other => other,
            };
            let committed = self.commit(run, stage, &metrics).await;
            let outcome = match outcome.and_then(|verdict| committed.map(|()| verdict)) {
                Ok(Verdict::Gate { score_ratio }) => self.decide(run, score_ratio, &mut metrics).await,
                other => other.map(|_| ()),
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(loop_id = %run.loop_id, %stage, iteration, "Stage completed");
                    StageResult::completed(stage, iteration, metrics, elapsed_ms(started))
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(loop_id = %run.loop_id, %stage, iteration, error = %e, "Stage failed");
                    StageResult::failed(stage, iteration, metrics, elapsed_ms(started), e.to_string())
                }
            }
        };

        let status = result.status;
        run.record(result)?;
        self.control.publish(run);
        Ok(status)
    }

    async fn attempt(&mut self, run: &mut LoopRun, stage: Stage, metrics: &mut Metrics) -> Result<Verdict> {
        match stage {
            Stage::Collecting => self.collect(metrics).await.map(|()| Verdict::Done),
            Stage::Curating => self.curate(metrics).await.map(|()| Verdict::Done),
            Stage::Optimizing => self.optimize(metrics).await.map(|()| Verdict::Done),
            Stage::Evaluating => self.evaluate(run, metrics).await,
            Stage::Deploying => self.deploy(run.current_iteration, metrics).await.map(|()| Verdict::Done),
            Stage::Monitoring => self.monitor(metrics).await.map(|()| Verdict::Done),
            Stage::Idle => Err(ImprovrError::InvariantViolation(
                "idle is not an executable stage".to_string(),
            )),
        }
    }

    /// Merge stage output into the run and persist the durability checkpoint
    async fn commit(&self, run: &mut LoopRun, stage: Stage, metrics: &Metrics) -> Result<()> {
        run.merge_metrics(metrics);
        let loop_id = run.loop_id.as_str();
        retry_with_backoff(&self.config.retry, "record_loop_iteration", || {
            self.recorder.record_loop_iteration(loop_id, stage, metrics)
        })
        .await
    }

    async fn collect(&mut self, metrics: &mut Metrics) -> Result<()> {
        let window = self
            .input
            .time_window
            .unwrap_or_else(|| TimeWindow::trailing_days(self.config.window_days));
        let signals = retry_with_backoff(&self.config.retry, "collect_signals", || {
            self.collaborators
                .collect_signals(&self.input.project_id, &window, &self.input.signal_types)
        })
        .await?;

        metrics.insert(SIGNAL_COUNT.to_string(), signals.count as f64);
        self.carry.signals = Some(signals);
        Ok(())
    }

    async fn curate(&mut self, metrics: &mut Metrics) -> Result<()> {
        let raw = self.carry.signals.clone().unwrap_or_default();
        let constraints = &self.config.curation;
        let curated = retry_with_backoff(&self.config.retry, "curate_training_data", || {
            self.collaborators.curate_training_data(&raw, constraints)
        })
        .await?;

        let score = curated.quality_score;
        metrics.insert(QUALITY_SCORE.to_string(), score);
        metrics.insert(CURATED_COUNT.to_string(), curated.examples.len() as f64);
        self.carry.curated = Some(curated);

        if score <= constraints.min_quality {
            return Err(ImprovrError::QualityGate {
                score,
                floor: constraints.min_quality,
            });
        }
        Ok(())
    }

    async fn optimize(&self, metrics: &mut Metrics) -> Result<()> {
        let curated = self.carry.curated.clone().unwrap_or_default();
        let outcome = retry_with_backoff(&self.config.retry, "run_optimization", || {
            self.collaborators
                .run_optimization(&curated, self.input.strategy, &self.input.prompt_id)
        })
        .await?;

        metrics.insert(CANDIDATE_SCORE.to_string(), outcome.candidate_score);
        Ok(())
    }

    async fn evaluate(&self, run: &mut LoopRun, metrics: &mut Metrics) -> Result<Verdict> {
        let iteration = run.current_iteration;
        let params = EvaluationParams {
            project_id: self.input.project_id.clone(),
            agent_id: self.input.prompt_id.clone(),
            agent_version: candidate_version(iteration),
            dataset: self.input.suite_id.clone(),
            scorers: self.config.scorers.clone(),
        };
        let launcher = &self.launcher;
        let outcome = retry_with_backoff(&self.config.retry, "evaluation_run", || {
            launcher.spawn_evaluation(iteration, params.clone()).join()
        })
        .await?;

        let eval_score = outcome.summary.avg_score;
        // Set on first use, before the gate: a rejected first candidate still fixes the baseline
        let baseline = run.establish_baseline(eval_score);
        let score_ratio = eval_score / baseline;
        metrics.insert(EVAL_SCORE.to_string(), eval_score);
        metrics.insert(BASELINE_SCORE.to_string(), baseline);
        metrics.insert(SCORE_RATIO.to_string(), score_ratio);
        Ok(Verdict::Gate { score_ratio })
    }

    /// Approval gate over an evaluation whose checkpoint is already written
    async fn decide(&self, run: &mut LoopRun, score_ratio: f64, metrics: &mut Metrics) -> Result<()> {
        // Reviewers see the ratio while the gate waits
        self.control.publish(run);
        let verdict = apply_gate(self.control, score_ratio, self.input.improvement_threshold, metrics).await;
        run.merge_metrics(metrics);
        verdict
    }

    async fn deploy(&self, iteration: u32, metrics: &mut Metrics) -> Result<()> {
        let params = RolloutParams {
            current_agent: AgentRef {
                agent_id: self.input.prompt_id.clone(),
                version: PRODUCTION_VERSION.to_string(),
            },
            new_agent: AgentRef {
                agent_id: self.input.prompt_id.clone(),
                version: candidate_version(iteration),
            },
            dataset: self.input.suite_id.clone(),
            scorers: self.config.scorers.clone(),
            stages: self.config.rollout_stages.clone(),
            min_score: self.config.rollout_min_score,
            stage_duration_secs: self.config.stage_duration_secs,
        };
        let launcher = &self.launcher;
        let outcome = retry_with_backoff(&self.config.retry, "progressive_rollout", || {
            launcher.spawn_rollout(iteration, params.clone()).join()
        })
        .await?;

        metrics.insert(ROLLOUT_COMPLETED.to_string(), flag(outcome.completed));
        metrics.insert(FINAL_STAGE.to_string(), outcome.final_stage as f64);

        if !outcome.completed {
            return Err(ImprovrError::RolloutIncomplete {
                final_stage: outcome.final_stage,
            });
        }
        Ok(())
    }

    async fn monitor(&self, metrics: &mut Metrics) -> Result<()> {
        let sample_size = self.config.regression_sample_size;
        let status = retry_with_backoff(&self.config.retry, "check_regression_status", || {
            self.collaborators
                .check_regression_status(&self.input.suite_id, sample_size)
        })
        .await?;

        metrics.insert(HAS_REGRESSION.to_string(), flag(status.has_regression));
        metrics.insert(SAMPLE_SIZE.to_string(), sample_size as f64);
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
