//! SessionStatus enum for tracking the lifecycle of a flow session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{StateMachine, ValidationError};

/// Lifecycle status of a flow session.
///
/// ```text
/// Pending -> Running <-> Paused
///            Running -> Completed | Failed
///            Paused  -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Returns true if a step may be executed in this status.
    pub fn accepts_steps(&self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Running)
    }

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
        }
    }
}

impl StateMachine for SessionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SessionStatus::*;
        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SessionStatus::*;
        match self {
            Pending => vec![Running, Failed],
            Running => vec![Paused, Completed, Failed],
            Paused => vec![Running, Failed],
            Completed | Failed => vec![],
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SessionStatus::Pending),
            "RUNNING" => Ok(SessionStatus::Running),
            "PAUSED" => Ok(SessionStatus::Paused),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "FAILED" => Ok(SessionStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "session_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}
