//! Error types for Improvr
//!
//! Centralized error handling using thiserror. Variants follow the failure
//! taxonomy of a training loop: transient collaborator errors are retried,
//! business-rule failures end the current stage, and fatal errors escape the
//! run altogether.

use thiserror::Error;

/// All error types that can occur in Improvr
#[derive(Debug, Error)]
pub enum ImprovrError {
    /// Network/timeout failure of a collaborator (retried with backoff)
    #[error("Transient collaborator error: {0}")]
    Transient(String),

    /// Curated data did not clear the quality floor
    #[error("Quality gate failed: score {score:.3} <= floor {floor:.3}")]
    QualityGate { score: f64, floor: f64 },

    /// Progressive rollout stopped before completion
    #[error("Rollout incomplete: stopped at stage {final_stage}")]
    RolloutIncomplete { final_stage: u32 },

    /// Reviewer rejected the candidate in the approval gate
    #[error("Candidate rejected by reviewer")]
    UserRejected,

    /// Candidate scored below the auto-reject floor
    #[error("Score ratio {ratio:.3} below floor {floor:.3}")]
    ScoreBelowThreshold { ratio: f64, floor: f64 },

    /// Operator aborted the run
    #[error("Aborted by operator")]
    Aborted,

    /// A run invariant was broken; indicates a defect
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Non-transient collaborator failure
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Child workflow could not be joined
    #[error("Child process error: {0}")]
    ChildProcess(String),

    /// Run was forcibly terminated
    #[error("Terminated: {0}")]
    Terminated(String),

    /// Input rejected before the run started
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImprovrError {
    /// Whether the retry harness should try the operation again
    pub fn is_transient(&self) -> bool {
        matches!(self, ImprovrError::Transient(_))
    }

    /// Whether the error must escape the run instead of failing a stage
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImprovrError::Terminated(_) | ImprovrError::InvariantViolation(_)
        )
    }
}

/// Result type alias for Improvr operations
pub type Result<T> = std::result::Result<T, ImprovrError>;
