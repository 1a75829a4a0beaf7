use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::escalation::EscalationAction;

/// Manual intervention a proctor can take on a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProctorAction {
    /// Broadcast a warning to the subject
    Warn,
    /// Mark the session for review and notify every subscriber
    Escalate,
    /// End the session as terminated
    Terminate,
}

impl ProctorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProctorAction::Warn => "warn",
            ProctorAction::Escalate => "escalate",
            ProctorAction::Terminate => "terminate",
        }
    }

    /// The escalation level this action corresponds to.
    pub fn escalation(&self) -> EscalationAction {
        match self {
            ProctorAction::Warn => EscalationAction::Warn,
            ProctorAction::Escalate => EscalationAction::Escalate,
            ProctorAction::Terminate => EscalationAction::Terminate,
        }
    }
}

impl std::fmt::Display for ProctorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProctorAction {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(ProctorAction::Warn),
            "escalate" => Ok(ProctorAction::Escalate),
            "terminate" => Ok(ProctorAction::Terminate),
            other => Err(MonitorError::InvalidAction(other.to_string())),
        }
    }
}
