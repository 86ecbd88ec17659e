//! Approval gate applied at the end of the evaluate stage.
//!
//! The candidate/baseline score ratio is compared against a band of
//! `1 ± improvement_threshold`. Above the band the candidate ships, below it
//! the candidate is dropped, and inside it a human reviewer decides.

use crate::coordination::{LoopControl, ReviewVerdict};
use crate::domain::metrics::{DECISION, Metrics};
use crate::error::{ImprovrError, Result};

/// Outcome of comparing a score ratio against the threshold band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    AutoApprove,
    NeedsReview,
    AutoReject,
}

/// Classify a score ratio
pub fn evaluate_gate(score_ratio: f64, threshold: f64) -> GateDecision {
    if score_ratio >= 1.0 + threshold {
        GateDecision::AutoApprove
    } else if score_ratio >= 1.0 - threshold {
        GateDecision::NeedsReview
    } else {
        GateDecision::AutoReject
    }
}

/// Decide whether the candidate proceeds to deployment
///
/// Records `decision` as 1 (auto-approved), 0 (approved on review) or -1
/// (rejected). Review waits are released early by abort, which fails the
/// stage without a decision.
pub async fn apply_gate(
    control: &LoopControl,
    score_ratio: f64,
    threshold: f64,
    metrics: &mut Metrics,
) -> Result<()> {
    match evaluate_gate(score_ratio, threshold) {
        GateDecision::AutoApprove => {
            metrics.insert(DECISION.to_string(), 1.0);
            Ok(())
        }
        GateDecision::AutoReject => {
            metrics.insert(DECISION.to_string(), -1.0);
            Err(ImprovrError::ScoreBelowThreshold {
                ratio: score_ratio,
                floor: 1.0 - threshold,
            })
        }
        GateDecision::NeedsReview => {
            tracing::info!(
                loop_id = %control.loop_id(),
                score_ratio,
                threshold,
                "Score ratio inside review band, awaiting approval"
            );
            control.clear_review();
            match control.wait_for_review().await {
                ReviewVerdict::Approved => {
                    metrics.insert(DECISION.to_string(), 0.0);
                    Ok(())
                }
                ReviewVerdict::Rejected => {
                    metrics.insert(DECISION.to_string(), -1.0);
                    Err(ImprovrError::UserRejected)
                }
                ReviewVerdict::Aborted => Err(ImprovrError::Aborted),
            }
        }
    }
}
