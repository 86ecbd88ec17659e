//! Storage layer for Improvr - durable iteration checkpoints.
//!
//! Checkpoints are appended to a single JSONL file in the record directory
//! and can be read back per loop for `improvr history`.

mod jsonl;

pub use jsonl::{ITERATIONS_FILE, IterationRecord, JsonlRecorder};
