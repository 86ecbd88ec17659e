//! Loop controller: the top-level driver of a training loop.
//!
//! Each iteration runs collect, curate, optimize, evaluate, deploy and
//! monitor in order, with a pause/abort checkpoint before every stage. A
//! failed stage ends the run. Monitoring that reports a regression starts the
//! next iteration, up to `max_iterations`; anything else ends the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::collaborators::{ChildWorkflows, Collaborators, CurationConstraints, IterationRecorder};
use crate::config::GlobalConfig;
use crate::coordination::{LoopControl, LoopHandle};
use crate::domain::metrics::HAS_REGRESSION;
use crate::domain::{LoopRun, Stage, StageStatus, TrainingLoopInput, TrainingLoopResult};
use crate::error::{ImprovrError, Result};
use crate::id::generate_loop_id;
use crate::stages::StageExecutor;

use super::retry::RetryPolicy;

/// Runtime settings for the controller and its stages
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub retry: RetryPolicy,
    pub curation: CurationConstraints,
    /// Trailing collection window when the input names none
    pub window_days: u32,
    pub scorers: Vec<String>,
    /// Traffic percentage per rollout stage
    pub rollout_stages: Vec<u32>,
    pub rollout_min_score: f64,
    pub stage_duration_secs: u64,
    /// Traces inspected by the regression check
    pub regression_sample_size: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

impl From<&GlobalConfig> for ControllerConfig {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts,
                initial_delay: Duration::from_millis(config.retry.initial_delay_ms),
                max_delay: Duration::from_millis(config.retry.max_delay_ms),
                multiplier: config.retry.multiplier,
            },
            curation: CurationConstraints {
                min_quality: config.curation.min_quality,
                max_samples: config.curation.max_samples,
                balance_classes: config.curation.balance_classes,
            },
            window_days: config.collection.window_days,
            scorers: config.evaluation.scorers.clone(),
            rollout_stages: config.rollout.stages.clone(),
            rollout_min_score: config.rollout.min_score,
            stage_duration_secs: config.rollout.stage_duration_secs,
            regression_sample_size: config.monitoring.sample_size,
        }
    }
}

/// Drives training loops against a set of collaborators
pub struct LoopController {
    collaborators: Arc<dyn Collaborators>,
    recorder: Arc<dyn IterationRecorder>,
    workflows: Arc<dyn ChildWorkflows>,
    config: ControllerConfig,
}

impl LoopController {
    pub fn new(
        collaborators: Arc<dyn Collaborators>,
        recorder: Arc<dyn IterationRecorder>,
        workflows: Arc<dyn ChildWorkflows>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            collaborators,
            recorder,
            workflows,
            config,
        }
    }

    /// Controller whose collaborators, recorder and child workflows are one backend
    pub fn with_backend<B>(backend: Arc<B>, config: ControllerConfig) -> Self
    where
        B: Collaborators + IterationRecorder + ChildWorkflows + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend, config)
    }

    /// Spawn a run on the tokio runtime under a fresh loop ID
    pub fn start(self: &Arc<Self>, input: TrainingLoopInput) -> (LoopHandle, JoinHandle<Result<TrainingLoopResult>>) {
        let (handle, control) = LoopControl::new(generate_loop_id());
        let controller = Arc::clone(self);
        let join = tokio::spawn(async move { controller.run_training_loop(input, control).await });
        (handle, join)
    }

    /// Run a training loop to completion
    ///
    /// Business outcomes (completed, failed, aborted) are reported through
    /// the result. `Err` means invalid input, forcible termination through
    /// `LoopHandle::terminate`, or a broken internal invariant.
    pub async fn run_training_loop(
        &self,
        input: TrainingLoopInput,
        control: LoopControl,
    ) -> Result<TrainingLoopResult> {
        input.validate()?;
        let cancel = control.cancel_token();

        tracing::info!(
            loop_id = %control.loop_id(),
            project_id = %input.project_id,
            suite_id = %input.suite_id,
            prompt_id = %input.prompt_id,
            strategy = %input.strategy,
            trigger = %input.trigger,
            max_iterations = input.max_iterations,
            "Starting training loop"
        );

        // Dropping the drive future on termination drops any in-flight child
        // handle, and child tokens descend from `cancel`.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(loop_id = %control.loop_id(), "Training loop terminated");
                Err(ImprovrError::Terminated(control.loop_id().to_string()))
            }
            result = self.drive(&input, &control) => result,
        }
    }

    async fn drive(&self, input: &TrainingLoopInput, control: &LoopControl) -> Result<TrainingLoopResult> {
        let started = Instant::now();
        let mut run = LoopRun::new(control.loop_id(), input.max_iterations);
        if let Some(baseline) = input.baseline_score {
            run.seed_baseline(baseline);
        }
        control.publish(&run);

        let mut executor = StageExecutor::new(
            self.collaborators.as_ref(),
            self.recorder.as_ref(),
            self.workflows.clone(),
            &self.config,
            input,
            control,
        );

        'iterations: while run.has_iterations_left() && !control.is_aborted() {
            let iteration = run.begin_iteration()?;
            control.publish(&run);
            tracing::info!(loop_id = %run.loop_id, iteration, max_iterations = run.max_iterations, "Starting iteration");

            for stage in Stage::PIPELINE {
                if !checkpoint(control).await {
                    tracing::info!(loop_id = %run.loop_id, next_stage = %stage, "Abort observed at checkpoint");
                    break 'iterations;
                }
                if executor.execute(&mut run, stage).await? == StageStatus::Failed {
                    break 'iterations;
                }
            }

            if !regression_detected(&run) {
                break;
            }
            tracing::info!(loop_id = %run.loop_id, iteration, "Regression detected, re-entering collection");
        }

        run.stage = Stage::Idle;
        control.publish(&run);

        let status = run.final_status(control.is_aborted());
        let total_duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            loop_id = %run.loop_id,
            ?status,
            iterations = run.current_iteration,
            stages = run.history().len(),
            total_duration_ms,
            "Training loop finished"
        );
        Ok(run.into_result(status, total_duration_ms))
    }
}

/// Inter-stage checkpoint. Returns false once the run is aborted.
async fn checkpoint(control: &LoopControl) -> bool {
    let flags = control.flags();
    if flags.aborted {
        return false;
    }
    if flags.paused {
        tracing::info!(loop_id = %control.loop_id(), "Paused at checkpoint");
        if control.wait_while_paused().await {
            return false;
        }
        tracing::info!(loop_id = %control.loop_id(), "Resumed");
    }
    true
}

/// Whether the iteration just finished asks for another one
fn regression_detected(run: &LoopRun) -> bool {
    run.last_result()
        .filter(|r| r.stage == Stage::Monitoring && r.status == StageStatus::Completed)
        .and_then(|r| r.metric(HAS_REGRESSION))
        .is_some_and(|flag| flag == 1.0)
}
