//! Control-state store, signal routing and status queries
//!
//! - `LoopControl`: controller-side access (checkpoint reads, flag
//!   consumption, cooperative waits, status publishing)
//! - `LoopHandle`: operator-side access (signals, status snapshots,
//!   forcible termination)

pub mod control;
pub mod handle;

pub use control::{ControlFlags, LoopControl, ReviewVerdict};
pub use handle::LoopHandle;
