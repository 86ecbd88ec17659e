//! ID generation utilities for Improvr
//!
//! Provides functions for generating identifiers for training loops and the
//! child workflows they spawn.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a unique training loop ID
///
/// Format: `loop-{timestamp_ms}-{random_hex}`
/// Example: `loop-1738300800123-a1b2`
pub fn generate_loop_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("loop-{}-{:04x}", timestamp, random)
}

/// Generate the deterministic ID of a child workflow
///
/// Format: `{loop_id}-{stage}-{iteration}`
/// Example: `loop-1738300800123-a1b2-evaluating-2`
///
/// The same loop, stage and iteration always produce the same ID, so a
/// retried spawn addresses the same child.
pub fn generate_child_id(loop_id: &str, stage: &str, iteration: u32) -> String {
    format!("{}-{}-{}", loop_id, stage, iteration)
}
