//! Domain types for Improvr
//!
//! This module contains all core domain types:
//! - Stage: the seven controller states and per-attempt status
//! - StageResult: immutable audit record of one stage attempt
//! - TrainingLoopInput / TrainingLoopResult: entry and terminal artifacts
//! - LoopRun: mutable data of a run (iteration, metrics, baseline, history)
//! - TrainingLoopStatus: snapshot served to pollers
//! - SignalType: operator control signals

pub mod metrics;
pub mod run;
pub mod signal;
pub mod stage;
pub mod stage_result;
pub mod status;
pub mod training;

pub use metrics::Metrics;
pub use run::LoopRun;
pub use signal::SignalType;
pub use stage::{Stage, StageStatus};
pub use stage_result::StageResult;
pub use status::TrainingLoopStatus;
pub use training::{
    OptimizationStrategy, RunStatus, TimeWindow, TrainingLoopInput, TrainingLoopResult,
    TriggerReason,
};
