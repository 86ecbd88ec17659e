//! Status snapshot served to pollers.

use serde::{Deserialize, Serialize};

use super::metrics::Metrics;
use super::stage::Stage;
use super::stage_result::StageResult;

/// Immutable view of a run at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoopStatus {
    pub loop_id: String,
    pub stage: Stage,
    /// Completed stage attempts divided by the stages per iteration
    pub progress: f64,
    pub metrics: Metrics,
    pub history: Vec<StageResult>,
    pub is_paused: bool,
    pub is_aborted: bool,
    /// True while the approval gate waits for approve/reject
    pub awaiting_approval: bool,
    pub current_iteration: u32,
    pub max_iterations: u32,
}

impl TrainingLoopStatus {
    /// Status of a run that has not started its first iteration
    pub fn idle(loop_id: impl Into<String>) -> Self {
        Self {
            loop_id: loop_id.into(),
            stage: Stage::Idle,
            progress: 0.0,
            metrics: Metrics::new(),
            history: Vec::new(),
            is_paused: false,
            is_aborted: false,
            awaiting_approval: false,
            current_iteration: 0,
            max_iterations: 0,
        }
    }
}
