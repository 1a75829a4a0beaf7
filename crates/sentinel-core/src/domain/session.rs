//! Session identity, lifecycle status and the views handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::Alert;

/// Identity of one monitored exam attempt, as supplied to StartSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub attempt_id: String,
}

impl SessionInfo {
    pub fn new(
        session_id: impl Into<String>,
        subject_id: impl Into<String>,
        exam_id: impl Into<String>,
        attempt_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            subject_id: subject_id.into(),
            exam_id: exam_id.into(),
            attempt_id: attempt_id.into(),
        }
    }
}

/// Lifecycle status.
///
/// `Initializing -> Active -> {Completed, Terminated, Flagged}`; the three
/// end states are terminal and transitions never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Active,
    Completed,
    Terminated,
    Flagged,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Terminated | SessionStatus::Flagged
        )
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        match (self, next) {
            (SessionStatus::Initializing, SessionStatus::Active) => true,
            // a session can be ended before its loop reports in
            (SessionStatus::Initializing, n) if n.is_terminal() => true,
            (SessionStatus::Active, n) if n.is_terminal() => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Flagged => "flagged",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a session's state, published by its monitor loop
/// after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub info: SessionInfo,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
    pub frames_processed: u64,
    pub alerts_generated: u64,
    pub violations_detected: u64,
    /// 1.0 is clean; never rises while the session is active
    pub integrity_score: f64,
    /// Set once any escalation (automatic or manual) was raised
    pub escalated: bool,
    /// Cycles that fell back to the default judgment
    pub degraded_cycles: u64,
    /// Whether the most recent cycle fell back to the default judgment
    pub analysis_degraded: bool,
    /// Most recent alerts, oldest first
    pub recent_alerts: Vec<Alert>,
}

impl SessionSnapshot {
    pub fn new(info: SessionInfo) -> Self {
        Self {
            info,
            status: SessionStatus::Initializing,
            created_at: Utc::now(),
            ended_at: None,
            end_reason: None,
            frames_processed: 0,
            alerts_generated: 0,
            violations_detected: 0,
            integrity_score: 1.0,
            escalated: false,
            degraded_cycles: 0,
            analysis_degraded: false,
            recent_alerts: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            session_id: self.info.session_id.clone(),
            status: self.status,
            integrity_score: self.integrity_score,
            frames_processed: self.frames_processed,
            alerts_generated: self.alerts_generated,
            violations_detected: self.violations_detected,
            analysis_degraded: self.analysis_degraded,
            recent_alerts: self.recent_alerts.clone(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.info.session_id.clone(),
            frames_processed: self.frames_processed,
            alerts_generated: self.alerts_generated,
            violations_detected: self.violations_detected,
            integrity_score: self.integrity_score,
            final_status: self.status,
            end_reason: self.end_reason.clone(),
            ended_at: self.ended_at,
        }
    }
}

/// Answer to GetStatus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub integrity_score: f64,
    pub frames_processed: u64,
    pub alerts_generated: u64,
    pub violations_detected: u64,
    pub analysis_degraded: bool,
    pub recent_alerts: Vec<Alert>,
}

/// Answer to EndSession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub frames_processed: u64,
    pub alerts_generated: u64,
    pub violations_detected: u64,
    pub integrity_score: f64,
    pub final_status: SessionStatus,
    pub end_reason: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}
