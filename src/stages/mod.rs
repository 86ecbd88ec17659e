//! Stage executors
//!
//! The six pipeline stages share one envelope (skip handling, metric merge,
//! durability checkpoint, history append). The approval gate runs inside the
//! evaluate stage.

pub mod executor;
pub mod gate;

pub use executor::{PRODUCTION_VERSION, StageExecutor, candidate_version};
pub use gate::{GateDecision, apply_gate, evaluate_gate};
