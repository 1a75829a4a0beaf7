//! Escalation policy evaluation.
//!
//! [`evaluate`] is a pure function of tracker state and policy; it never
//! mutates anything. Rules, first match wins:
//!
//! | Condition | Action | Reason |
//! |-----------|--------|--------|
//! | any critical violation recorded | terminate | `critical_violation_detected` |
//! | alerts > `max_alerts` | escalate | `excessive_alerts` |
//! | any streak > `max_streak` | escalate | `consecutive_violations` |
//! | otherwise | none | |

use serde::{Deserialize, Serialize};

use crate::tracker::ViolationTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Escalate once the session's alert count exceeds this
    pub max_alerts: u64,
    /// Escalate once any violation streak exceeds this
    pub max_streak: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            max_alerts: 5,
            max_streak: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    None,
    Warn,
    Escalate,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    CriticalViolationDetected,
    ExcessiveAlerts,
    ConsecutiveViolations,
    /// Raised by a proctor rather than by policy
    ProctorAction,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::CriticalViolationDetected => "critical_violation_detected",
            EscalationReason::ExcessiveAlerts => "excessive_alerts",
            EscalationReason::ConsecutiveViolations => "consecutive_violations",
            EscalationReason::ProctorAction => "proctor_action",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub action: EscalationAction,
    pub reason: Option<EscalationReason>,
}

impl EscalationDecision {
    pub const NONE: EscalationDecision = EscalationDecision {
        action: EscalationAction::None,
        reason: None,
    };

    fn with(action: EscalationAction, reason: EscalationReason) -> Self {
        Self {
            action,
            reason: Some(reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.action == EscalationAction::Terminate
    }
}

pub fn evaluate(tracker: &ViolationTracker, policy: &EscalationPolicy) -> EscalationDecision {
    if tracker.has_critical() {
        return EscalationDecision::with(
            EscalationAction::Terminate,
            EscalationReason::CriticalViolationDetected,
        );
    }
    if tracker.alert_count() > policy.max_alerts {
        return EscalationDecision::with(
            EscalationAction::Escalate,
            EscalationReason::ExcessiveAlerts,
        );
    }
    if tracker
        .max_streak()
        .is_some_and(|(_, streak)| streak > policy.max_streak)
    {
        return EscalationDecision::with(
            EscalationAction::Escalate,
            EscalationReason::ConsecutiveViolations,
        );
    }
    EscalationDecision::NONE
}
