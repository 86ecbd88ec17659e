//! Child workflow management
//!
//! Spawns the evaluation-run and progressive-rollout children with
//! cancellation linked to the parent run.

mod spawner;

pub use spawner::{ChildHandle, ChildLauncher};
