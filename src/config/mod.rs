//! Configuration system for Improvr.
//!
//! A single global layer (~/.config/improvr/improvr.yml or .improvr.yml)
//! feeds the controller settings; per-run settings come from the
//! `TrainingLoopInput` itself.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{
    CollectionConfig, CurationConfig, EvaluationConfig, GlobalConfig, MonitoringConfig, RetryConfig,
    RolloutConfig, StorageConfig,
};

mod global;

/// Load and validate configuration from the standard search paths.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    let config = GlobalConfig::load(explicit_path)?;
    config.validate()?;
    Ok(config)
}
