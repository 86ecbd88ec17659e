//! Improvr - a closed-loop continuous-improvement orchestrator
//!
//! Improvr drives an agent prompt through collect, curate, optimize,
//! evaluate, deploy and monitor, re-entering collection when monitoring
//! detects a regression. Operators steer a running loop with pause, resume,
//! abort, approve, reject and skip signals and poll its status at any time.

pub mod collaborators;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod id;
pub mod manager;
pub mod runner;
pub mod stages;
pub mod storage;

pub use error::{ImprovrError, Result};
