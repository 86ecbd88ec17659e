//! Metric names recorded by the pipeline stages.
//!
//! Keys are shared with external dashboards, so they keep their camelCase
//! wire names.

use std::collections::BTreeMap;

/// Metric map: name -> value
pub type Metrics = BTreeMap<String, f64>;

pub const SIGNAL_COUNT: &str = "signalCount";
pub const QUALITY_SCORE: &str = "qualityScore";
pub const CURATED_COUNT: &str = "curatedCount";
pub const CANDIDATE_SCORE: &str = "candidateScore";
pub const EVAL_SCORE: &str = "evalScore";
pub const BASELINE_SCORE: &str = "baselineScore";
pub const SCORE_RATIO: &str = "scoreRatio";
pub const DECISION: &str = "decision";
pub const ROLLOUT_COMPLETED: &str = "rolloutCompleted";
pub const FINAL_STAGE: &str = "finalStage";
pub const HAS_REGRESSION: &str = "hasRegression";
pub const SAMPLE_SIZE: &str = "sampleSize";

/// Encode a flag the way metrics carry booleans
pub fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}
