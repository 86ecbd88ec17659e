//! Training loop input and terminal result.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::Metrics;
use super::stage_result::StageResult;
use crate::error::{ImprovrError, Result};

/// Default number of iterations a loop may run
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Default half-width of the approval band around a score ratio of 1
pub const DEFAULT_IMPROVEMENT_THRESHOLD: f64 = 0.02;

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_improvement_threshold() -> f64 {
    DEFAULT_IMPROVEMENT_THRESHOLD
}

/// Prompt optimization strategy handed to the optimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationStrategy {
    #[default]
    CoordinateAscent,
    ExampleSelection,
    Reflection,
}

impl OptimizationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStrategy::CoordinateAscent => "coordinate-ascent",
            OptimizationStrategy::ExampleSelection => "example-selection",
            OptimizationStrategy::Reflection => "reflection",
        }
    }
}

impl fmt::Display for OptimizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the loop was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    #[default]
    Manual,
    Scheduled,
    Regression,
    SignalThreshold,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Manual => "manual",
            TriggerReason::Scheduled => "scheduled",
            TriggerReason::Regression => "regression",
            TriggerReason::SignalThreshold => "signal-threshold",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed time range for signal collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window ending now and reaching back `days` days
    pub fn trailing_days(days: u32) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }
}

/// Configuration of one training loop run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoopInput {
    pub project_id: String,
    pub suite_id: String,
    pub prompt_id: String,
    #[serde(default)]
    pub strategy: OptimizationStrategy,
    #[serde(default)]
    pub trigger: TriggerReason,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f64,
    /// Signal types to collect (all types when empty)
    #[serde(default)]
    pub signal_types: Vec<String>,
    /// Collection window (trailing window from config when absent)
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Known production score to compare the first candidate against
    #[serde(default)]
    pub baseline_score: Option<f64>,
}

impl TrainingLoopInput {
    /// Input with default tuning for the given project, suite and prompt
    pub fn new(
        project_id: impl Into<String>,
        suite_id: impl Into<String>,
        prompt_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            suite_id: suite_id.into(),
            prompt_id: prompt_id.into(),
            strategy: OptimizationStrategy::default(),
            trigger: TriggerReason::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            improvement_threshold: DEFAULT_IMPROVEMENT_THRESHOLD,
            signal_types: Vec::new(),
            time_window: None,
            baseline_score: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.improvement_threshold = threshold;
        self
    }

    pub fn with_baseline(mut self, baseline: f64) -> Self {
        self.baseline_score = Some(baseline);
        self
    }

    /// Reject inputs the controller cannot run
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("project_id", &self.project_id),
            ("suite_id", &self.suite_id),
            ("prompt_id", &self.prompt_id),
        ] {
            if value.trim().is_empty() {
                return Err(ImprovrError::InvalidInput(format!("{} must not be empty", name)));
            }
        }
        if self.max_iterations == 0 {
            return Err(ImprovrError::InvalidInput("max_iterations must be > 0".into()));
        }
        if !self.improvement_threshold.is_finite() || self.improvement_threshold < 0.0 {
            return Err(ImprovrError::InvalidInput(format!(
                "improvement_threshold must be a non-negative number, got {}",
                self.improvement_threshold
            )));
        }
        if let Some(window) = &self.time_window
            && window.start > window.end
        {
            return Err(ImprovrError::InvalidInput("time_window starts after it ends".into()));
        }
        if let Some(baseline) = self.baseline_score
            && !baseline.is_finite()
        {
            return Err(ImprovrError::InvalidInput("baseline_score must be finite".into()));
        }
        Ok(())
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Aborted,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal artifact of a training loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoopResult {
    pub loop_id: String,
    pub status: RunStatus,
    /// Full stage history, in execution order
    pub stages: Vec<StageResult>,
    /// Relative gain of the last completed evaluation over the baseline
    pub improvement: f64,
    pub total_duration_ms: u64,
    pub iterations: u32,
    pub baseline_score: Option<f64>,
    /// Metric map as it stood when the run ended
    pub metrics: Metrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults_from_yaml() {
        let yaml = "project_id: proj\nsuite_id: suite\nprompt_id: prompt\n";
        let input: TrainingLoopInput = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(input.max_iterations, 3);
        assert!((input.improvement_threshold - 0.02).abs() < f64::EPSILON);
        assert_eq!(input.strategy, OptimizationStrategy::CoordinateAscent);
        assert_eq!(input.trigger, TriggerReason::Manual);
        assert!(input.signal_types.is_empty());
        assert!(input.time_window.is_none());
        assert!(input.baseline_score.is_none());
    }

    #[test]
    fn test_strategy_kebab_case() {
        let yaml = "project_id: p\nsuite_id: s\nprompt_id: q\nstrategy: example-selection\ntrigger: signal-threshold\n";
        let input: TrainingLoopInput = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(input.strategy, OptimizationStrategy::ExampleSelection);
        assert_eq!(input.trigger, TriggerReason::SignalThreshold);
        assert_eq!(input.strategy.to_string(), "example-selection");
        assert_eq!(input.trigger.to_string(), "signal-threshold");
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(TrainingLoopInput::new("p", "s", "q").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let input = TrainingLoopInput::new("p", "s", "q").with_max_iterations(0);
        assert!(matches!(input.validate(), Err(ImprovrError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_empty_ids() {
        let input = TrainingLoopInput::new("p", " ", "q");
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("suite_id"));
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let input = TrainingLoopInput::new("p", "s", "q").with_threshold(-0.1);
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let mut input = TrainingLoopInput::new("p", "s", "q");
        let window = TimeWindow::trailing_days(7);
        input.time_window = Some(TimeWindow {
            start: window.end,
            end: window.start,
        });
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_trailing_window_length() {
        let window = TimeWindow::trailing_days(7);
        assert_eq!((window.end - window.start).num_days(), 7);
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(RunStatus::Aborted.to_string(), "aborted");
        assert_eq!(serde_json::to_string(&RunStatus::Failed).unwrap(), "\"failed\"");
    }
}
