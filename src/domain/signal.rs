//! Operator control signals
//!
//! Signals steer a running loop: pause, resume, abort, approve, reject and
//! skip the next stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Type of operator control signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    /// Suspend at the next checkpoint
    Pause,
    /// Continue a paused loop
    Resume,
    /// Terminate at the next checkpoint; releases any wait
    Abort,
    /// Accept a candidate waiting in the approval gate
    Approve,
    /// Reject a candidate waiting in the approval gate
    Reject,
    /// Skip whichever stage starts next
    SkipStage,
}

impl SignalType {
    pub const ALL: [SignalType; 6] = [
        SignalType::Pause,
        SignalType::Resume,
        SignalType::Abort,
        SignalType::Approve,
        SignalType::Reject,
        SignalType::SkipStage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Pause => "pause",
            SignalType::Resume => "resume",
            SignalType::Abort => "abort",
            SignalType::Approve => "approve",
            SignalType::Reject => "reject",
            SignalType::SkipStage => "skip-stage",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(SignalType::Pause),
            "resume" => Ok(SignalType::Resume),
            "abort" | "cancel" => Ok(SignalType::Abort),
            "approve" => Ok(SignalType::Approve),
            "reject" => Ok(SignalType::Reject),
            "skip" | "skip-stage" | "skipstage" => Ok(SignalType::SkipStage),
            other => Err(format!("unknown signal: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_type_serialization() {
        assert_eq!(serde_json::to_string(&SignalType::Pause).unwrap(), "\"pause\"");
        assert_eq!(
            serde_json::to_string(&SignalType::SkipStage).unwrap(),
            "\"skip-stage\""
        );
    }

    #[test]
    fn test_signal_type_parse_round_trip() {
        for signal in SignalType::ALL {
            assert_eq!(signal.as_str().parse::<SignalType>().unwrap(), signal);
        }
    }

    #[test]
    fn test_signal_type_parse_aliases() {
        assert_eq!("skip".parse::<SignalType>().unwrap(), SignalType::SkipStage);
        assert_eq!(" Abort ".parse::<SignalType>().unwrap(), SignalType::Abort);
        assert_eq!("cancel".parse::<SignalType>().unwrap(), SignalType::Abort);
    }

    #[test]
    fn test_signal_type_parse_unknown() {
        let err = "rebase".parse::<SignalType>().unwrap_err();
        assert!(err.contains("rebase"));
    }
}
