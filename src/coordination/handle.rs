//! Operator handle for a running training loop
//!
//! `LoopHandle` is the signal router and the status query service. Signals
//! are fire-and-forget: they merge into the control-state store and return at
//! once, taking effect the next time the controller polls a checkpoint.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::control::SharedState;
use crate::domain::{SignalType, TrainingLoopStatus};

/// Cloneable operator handle (signals + status queries)
#[derive(Clone)]
pub struct LoopHandle {
    loop_id: String,
    state: Arc<watch::Sender<SharedState>>,
    cancel: CancellationToken,
}

impl LoopHandle {
    pub(crate) fn new(
        loop_id: String,
        state: Arc<watch::Sender<SharedState>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            loop_id,
            state,
            cancel,
        }
    }

    pub fn loop_id(&self) -> &str {
        &self.loop_id
    }

    /// Deliver a control signal. Repeated signals are no-ops.
    pub fn send(&self, signal: SignalType) {
        let changed = self.state.send_if_modified(|s| s.flags.apply(signal));
        tracing::debug!(loop_id = %self.loop_id, signal = %signal, changed, "Control signal received");
    }

    pub fn pause(&self) {
        self.send(SignalType::Pause);
    }

    pub fn resume(&self) {
        self.send(SignalType::Resume);
    }

    pub fn abort(&self) {
        self.send(SignalType::Abort);
    }

    pub fn approve(&self) {
        self.send(SignalType::Approve);
    }

    pub fn reject(&self) {
        self.send(SignalType::Reject);
    }

    pub fn skip_stage(&self) {
        self.send(SignalType::SkipStage);
    }

    /// Forcibly terminate the run and any child workflow it has in flight
    pub fn terminate(&self) {
        tracing::warn!(loop_id = %self.loop_id, "Terminating training loop");
        self.cancel.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Snapshot of the run. Never blocks on stage work and never mutates state.
    pub fn status(&self) -> TrainingLoopStatus {
        self.state.borrow().view()
    }

    /// Wait until the status satisfies `predicate`, returning that snapshot
    pub async fn wait_for_status<F>(&self, predicate: F) -> TrainingLoopStatus
    where
        F: Fn(&TrainingLoopStatus) -> bool,
    {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| predicate(&s.view())).await {
            Ok(state) => state.view(),
            Err(_) => self.status(),
        }
    }
}
