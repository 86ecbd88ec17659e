//! Loop runner module - drives training loops.
//!
//! This module provides the core loop execution logic, including:
//! - LoopController sequencing stages, iterations and regression re-entry
//! - ControllerConfig runtime settings derived from the global config
//! - retry_with_backoff for transient collaborator failures

mod loop_controller;
pub mod retry;

pub use loop_controller::{ControllerConfig, LoopController};
pub use retry::{RetryPolicy, retry_with_backoff};
