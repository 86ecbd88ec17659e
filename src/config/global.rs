//! Global configuration.
//!
//! Loaded from ~/.config/improvr/improvr.yml or .improvr.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Global configuration for Improvr.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Signal collection settings.
    pub collection: CollectionConfig,

    /// Curation constraints.
    pub curation: CurationConfig,

    /// Evaluation child workflow settings.
    pub evaluation: EvaluationConfig,

    /// Progressive rollout schedule.
    pub rollout: RolloutConfig,

    /// Regression monitoring settings.
    pub monitoring: MonitoringConfig,

    /// Backoff for transient collaborator failures.
    pub retry: RetryConfig,

    /// Checkpoint storage.
    pub storage: StorageConfig,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .improvr.yml in current directory
    /// 3. ~/.config/improvr/improvr.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".improvr.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .improvr.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .improvr.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("improvr").join("improvr.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            eyre::bail!("retry.max-attempts must be > 0");
        }
        if !(0.0..=1.0).contains(&self.curation.min_quality) {
            eyre::bail!("curation.min-quality must be within [0, 1]");
        }
        if self.rollout.stages.is_empty() {
            eyre::bail!("rollout.stages must not be empty");
        }
        if self.rollout.stages.windows(2).any(|pair| pair[0] >= pair[1]) {
            eyre::bail!("rollout.stages must be strictly increasing");
        }
        if self.monitoring.sample_size == 0 {
            eyre::bail!("monitoring.sample-size must be > 0");
        }
        Ok(())
    }
}

/// Signal collection settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Trailing window used when the input names none.
    #[serde(rename = "window-days")]
    pub window_days: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self { window_days: 7 }
    }
}

/// Curation constraints.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Quality floor; curation at or below it fails the stage.
    #[serde(rename = "min-quality")]
    pub min_quality: f64,

    #[serde(rename = "max-samples")]
    pub max_samples: u32,

    #[serde(rename = "balance-classes")]
    pub balance_classes: bool,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            min_quality: 0.7,
            max_samples: 500,
            balance_classes: true,
        }
    }
}

/// Evaluation child workflow settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Scorers applied by the evaluation run and the rollout.
    pub scorers: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            scorers: vec!["accuracy".to_string(), "helpfulness".to_string()],
        }
    }
}

/// Progressive rollout schedule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Traffic percentage per rollout stage.
    pub stages: Vec<u32>,

    #[serde(rename = "min-score")]
    pub min_score: f64,

    #[serde(rename = "stage-duration-secs")]
    pub stage_duration_secs: u64,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            stages: vec![10, 25, 50, 100],
            min_score: 0.7,
            stage_duration_secs: 1800, // 30 minutes
        }
    }
}

/// Regression monitoring settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Number of recent traces inspected for regression.
    #[serde(rename = "sample-size")]
    pub sample_size: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { sample_size: 10 }
    }
}

/// Backoff for transient collaborator failures.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "initial-delay-ms")]
    pub initial_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2,
        }
    }
}

/// Checkpoint storage.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding iterations.jsonl.
    #[serde(rename = "record-dir")]
    pub record_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let default_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("improvr")
            .join("records");

        Self { record_dir: default_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.collection.window_days, 7);
        assert_eq!(config.curation.min_quality, 0.7);
        assert_eq!(config.rollout.stages, vec![10, 25, 50, 100]);
        assert_eq!(config.monitoring.sample_size, 10);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.storage.record_dir.ends_with("improvr/records"));
    }

    #[test]
    fn test_config_validation() {
        let config = GlobalConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_retry() {
        let config = GlobalConfig {
            retry: RetryConfig {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_rollout_schedule() {
        let mut config = GlobalConfig::default();
        config.rollout.stages = vec![10, 50, 50];
        assert!(config.validate().is_err());

        config.rollout.stages = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_min_quality() {
        let mut config = GlobalConfig::default();
        config.curation.min_quality = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
curation:
  min-quality: 0.8
rollout:
  stages: [5, 50, 100]
  stage-duration-secs: 60
retry:
  max-attempts: 3
"#;
        let config: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.curation.min_quality, 0.8);
        assert_eq!(config.rollout.stages, vec![5, 50, 100]);
        assert_eq!(config.rollout.stage_duration_secs, 60);
        assert_eq!(config.retry.max_attempts, 3);
        // Other fields should have defaults
        assert_eq!(config.curation.max_samples, 500);
        assert_eq!(config.rollout.min_score, 0.7);
        assert_eq!(config.monitoring.sample_size, 10);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "monitoring:\n  sample-size: 25").unwrap();

        let config = GlobalConfig::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.monitoring.sample_size, 25);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/improvr.yml");
        assert!(GlobalConfig::load(Some(&path)).is_err());
    }
}
