//! Child workflow launcher
//!
//! Spawns the evaluation-run and progressive-rollout child workflows as
//! tokio tasks. Every child gets a deterministic ID and a cancellation token
//! derived from the parent run's token: terminating the run cancels the child,
//! and dropping a `ChildHandle` before it is joined cancels it as well.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{
    ChildWorkflows, EvaluationOutcome, EvaluationParams, RolloutOutcome, RolloutParams,
};
use crate::domain::Stage;
use crate::error::{ImprovrError, Result};
use crate::id::generate_child_id;

/// Handle to an in-flight child workflow
pub struct ChildHandle<T> {
    id: String,
    cancel: CancellationToken,
    join: Option<JoinHandle<Result<T>>>,
}

impl<T> ChildHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rendezvous: wait for the child's terminal result
    ///
    /// Dropping the returned future before it resolves cancels the child.
    pub async fn join(mut self) -> Result<T> {
        let Some(join) = self.join.as_mut() else {
            return Err(ImprovrError::ChildProcess(format!("{} already joined", self.id)));
        };
        let outcome = join.await;
        self.join = None;
        match outcome {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ImprovrError::Terminated(self.id.clone())),
            Err(e) => Err(ImprovrError::ChildProcess(format!("{}: {}", self.id, e))),
        }
    }
}

impl<T> Drop for ChildHandle<T> {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            tracing::debug!(child_id = %self.id, "Dropping unjoined child, cancelling");
            self.cancel.cancel();
            join.abort();
        }
    }
}

/// Spawns child workflows linked to one parent run
pub struct ChildLauncher {
    workflows: Arc<dyn ChildWorkflows>,
    parent: CancellationToken,
    loop_id: String,
}

impl ChildLauncher {
    pub fn new(workflows: Arc<dyn ChildWorkflows>, loop_id: impl Into<String>, parent: CancellationToken) -> Self {
        Self {
            workflows,
            parent,
            loop_id: loop_id.into(),
        }
    }

    /// Deterministic ID of the child a stage spawns in an iteration
    pub fn child_id(&self, stage: Stage, iteration: u32) -> String {
        generate_child_id(&self.loop_id, stage.as_str(), iteration)
    }

    pub fn spawn_evaluation(&self, iteration: u32, params: EvaluationParams) -> ChildHandle<EvaluationOutcome> {
        let id = self.child_id(Stage::Evaluating, iteration);
        let workflows = self.workflows.clone();
        self.spawn(id, move |id, cancel| async move {
            workflows.evaluation_run(&id, params, cancel).await
        })
    }

    pub fn spawn_rollout(&self, iteration: u32, params: RolloutParams) -> ChildHandle<RolloutOutcome> {
        let id = self.child_id(Stage::Deploying, iteration);
        let workflows = self.workflows.clone();
        self.spawn(id, move |id, cancel| async move {
            workflows.progressive_rollout(&id, params, cancel).await
        })
    }

    fn spawn<T, F, Fut>(&self, id: String, body: F) -> ChildHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(String, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let cancel = self.parent.child_token();
        let work = body(id.clone(), cancel.clone());
        let task_cancel = cancel.clone();
        let task_id = id.clone();

        tracing::info!(loop_id = %self.loop_id, child_id = %id, "Spawning child workflow");
        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => Err(ImprovrError::Terminated(task_id)),
                result = work => result,
            }
        });

        ChildHandle {
            id,
            cancel,
            join: Some(join),
        }
    }
}
