//! Control-state store for a single training loop.
//!
//! Flags and the published status snapshot live in one `watch` channel.
//! Operators merge signals into it through a `LoopHandle`; the controller
//! reads and consumes flags at checkpoints through `LoopControl`. Waits are
//! predicates over the channel, so a signal that lands between a check and
//! the wait is never lost.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::handle::LoopHandle;
use crate::domain::{LoopRun, SignalType, TrainingLoopStatus};

/// Operator flags, set by signals and consumed by the stage logic that acts on them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlFlags {
    pub paused: bool,
    pub aborted: bool,
    pub approved: bool,
    pub rejected: bool,
    pub skip_stage: bool,
}

impl ControlFlags {
    /// Merge a signal, last write wins. Returns whether anything changed.
    pub fn apply(&mut self, signal: SignalType) -> bool {
        let before = *self;
        match signal {
            SignalType::Pause => self.paused = true,
            SignalType::Resume => self.paused = false,
            SignalType::Abort => self.aborted = true,
            SignalType::Approve => self.approved = true,
            SignalType::Reject => self.rejected = true,
            SignalType::SkipStage => self.skip_stage = true,
        }
        *self != before
    }
}

/// What the approval gate heard back from the reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewVerdict {
    Approved,
    Rejected,
    Aborted,
}

#[derive(Debug, Clone)]
pub(crate) struct SharedState {
    pub(crate) flags: ControlFlags,
    pub(crate) status: TrainingLoopStatus,
}

impl SharedState {
    /// Status as seen by pollers, with the live flag values folded in
    pub(crate) fn view(&self) -> TrainingLoopStatus {
        let mut status = self.status.clone();
        status.is_paused = self.flags.paused;
        status.is_aborted = self.flags.aborted;
        status
    }
}

/// Controller-side access to the control-state store
pub struct LoopControl {
    loop_id: String,
    state: Arc<watch::Sender<SharedState>>,
    cancel: CancellationToken,
}

impl LoopControl {
    /// Create the store for a run, returning the operator handle and the controller side
    pub fn new(loop_id: impl Into<String>) -> (LoopHandle, LoopControl) {
        let loop_id = loop_id.into();
        let (tx, _rx) = watch::channel(SharedState {
            flags: ControlFlags::default(),
            status: TrainingLoopStatus::idle(loop_id.clone()),
        });
        let state = Arc::new(tx);
        let cancel = CancellationToken::new();

        let handle = LoopHandle::new(loop_id.clone(), state.clone(), cancel.clone());
        let control = LoopControl {
            loop_id,
            state,
            cancel,
        };
        (handle, control)
    }

    pub fn loop_id(&self) -> &str {
        &self.loop_id
    }

    /// Token cancelled when the run is forcibly terminated
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn flags(&self) -> ControlFlags {
        self.state.borrow().flags
    }

    pub fn is_aborted(&self) -> bool {
        self.flags().aborted
    }

    /// Consume the skip flag, returning whether it was set
    pub fn take_skip(&self) -> bool {
        self.state
            .send_if_modified(|s| std::mem::take(&mut s.flags.skip_stage))
    }

    /// Drop any approve/reject that arrived before the gate opened
    pub fn clear_review(&self) {
        self.state.send_if_modified(|s| {
            let changed = s.flags.approved || s.flags.rejected;
            s.flags.approved = false;
            s.flags.rejected = false;
            changed
        });
    }

    /// Suspend until the loop is resumed or aborted. Returns true on abort.
    pub async fn wait_while_paused(&self) -> bool {
        let mut rx = self.state.subscribe();
        rx.wait_for(|s| s.flags.aborted || !s.flags.paused)
            .await
            .map(|s| s.flags.aborted)
            .unwrap_or(true)
    }

    /// Suspend until approve, reject or abort arrives, consuming approve/reject
    pub async fn wait_for_review(&self) -> ReviewVerdict {
        self.state.send_modify(|s| s.status.awaiting_approval = true);

        let mut rx = self.state.subscribe();
        let flags = rx
            .wait_for(|s| s.flags.aborted || s.flags.approved || s.flags.rejected)
            .await
            .map(|s| s.flags)
            .unwrap_or(ControlFlags {
                aborted: true,
                ..ControlFlags::default()
            });

        self.state.send_modify(|s| {
            s.flags.approved = false;
            s.flags.rejected = false;
            s.status.awaiting_approval = false;
        });

        if flags.aborted {
            ReviewVerdict::Aborted
        } else if flags.rejected {
            ReviewVerdict::Rejected
        } else {
            ReviewVerdict::Approved
        }
    }

    /// Publish the run's current data for pollers
    pub fn publish(&self, run: &LoopRun) {
        self.state.send_modify(|s| {
            let awaiting = s.status.awaiting_approval;
            s.status = run.snapshot();
            s.status.awaiting_approval = awaiting;
        });
    }
}
