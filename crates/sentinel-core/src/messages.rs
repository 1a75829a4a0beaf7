//! Outbound messages pushed to subject and proctor connections.
//!
//! Serialized as JSON objects tagged by `type`. Subject connections see
//! status, heartbeat and warning traffic; proctor connections see
//! everything, including alerts, escalation notices and raw status
//! snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Alert, SessionSnapshot, SessionStatus, StatusReport};

pub const CAMERA_CHECK_MESSAGE: &str =
    "No webcam input detected for 30 seconds. Please ensure camera is working.";
pub const CRITICAL_WARNING_MESSAGE: &str =
    "Critical proctoring violations detected. This exam session has been terminated.";

/// Counters carried by every `status_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub session_status: SessionStatus,
    pub frames_processed: u64,
    pub violations_detected: u64,
    pub alerts_generated: u64,
    pub integrity_score: f64,
    pub analysis_degraded: bool,
}

impl From<&SessionSnapshot> for StatusPayload {
    fn from(s: &SessionSnapshot) -> Self {
        Self {
            session_status: s.status,
            frames_processed: s.frames_processed,
            violations_detected: s.violations_detected,
            alerts_generated: s.alerts_generated,
            integrity_score: s.integrity_score,
            analysis_degraded: s.analysis_degraded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorMessage {
    /// Direct reply to a submitted sample
    FrameAck {
        session_id: String,
        sample_id: Uuid,
        status: String,
        queue_size: usize,
        timestamp: DateTime<Utc>,
    },
    StatusUpdate {
        session_id: String,
        status: StatusPayload,
        timestamp: DateTime<Utc>,
    },
    LiveAlert {
        session_id: String,
        alerts: Vec<Alert>,
        integrity_score: f64,
        analysis_degraded: bool,
        timestamp: DateTime<Utc>,
    },
    EscalationAlert {
        session_id: String,
        reason: String,
        action_required: bool,
        timestamp: DateTime<Utc>,
    },
    CriticalWarning {
        session_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    SessionEnded {
        session_id: String,
        reason: String,
        final_status: SessionStatus,
        timestamp: DateTime<Utc>,
    },
    /// Camera-check reminder after a sample drought
    Warning {
        session_id: String,
        message: String,
        action: String,
        timestamp: DateTime<Utc>,
    },
    /// Raw status snapshot, sent to proctors on attach
    #[serde(rename = "session_status")]
    StatusSnapshot {
        data: StatusReport,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "proctor_warn")]
    ProctorWarn {
        session_id: String,
        proctor_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "proctor_escalate")]
    ProctorEscalate {
        session_id: String,
        proctor_id: String,
        reason: String,
        action_required: bool,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    /// Reply to an inbound message that could not be applied
    Error {
        session_id: String,
        code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorMessage {
    pub fn status_update(snapshot: &SessionSnapshot) -> Self {
        MonitorMessage::StatusUpdate {
            session_id: snapshot.info.session_id.clone(),
            status: StatusPayload::from(snapshot),
            timestamp: Utc::now(),
        }
    }

    pub fn status_snapshot(snapshot: &SessionSnapshot) -> Self {
        MonitorMessage::StatusSnapshot {
            data: snapshot.report(),
            timestamp: Utc::now(),
        }
    }

    pub fn camera_check(session_id: &str) -> Self {
        MonitorMessage::Warning {
            session_id: session_id.to_string(),
            message: CAMERA_CHECK_MESSAGE.to_string(),
            action: "check_camera".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn critical_warning(session_id: &str) -> Self {
        MonitorMessage::CriticalWarning {
            session_id: session_id.to_string(),
            message: CRITICAL_WARNING_MESSAGE.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn escalation_alert(session_id: &str, reason: &str) -> Self {
        MonitorMessage::EscalationAlert {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
            action_required: true,
            timestamp: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        MonitorMessage::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn error(session_id: &str, code: &str, message: impl Into<String>) -> Self {
        MonitorMessage::Error {
            session_id: session_id.to_string(),
            code: code.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wire name of the message (`type` field).
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorMessage::FrameAck { .. } => "frame_ack",
            MonitorMessage::StatusUpdate { .. } => "status_update",
            MonitorMessage::LiveAlert { .. } => "live_alert",
            MonitorMessage::EscalationAlert { .. } => "escalation_alert",
            MonitorMessage::CriticalWarning { .. } => "critical_warning",
            MonitorMessage::SessionEnded { .. } => "session_ended",
            MonitorMessage::Warning { .. } => "warning",
            MonitorMessage::StatusSnapshot { .. } => "session_status",
            MonitorMessage::ProctorWarn { .. } => "proctor_warn",
            MonitorMessage::ProctorEscalate { .. } => "proctor_escalate",
            MonitorMessage::Pong { .. } => "pong",
            MonitorMessage::Error { .. } => "error",
        }
    }

    /// Messages that only proctor connections receive.
    pub fn is_proctor_only(&self) -> bool {
        matches!(
            self,
            MonitorMessage::LiveAlert { .. }
                | MonitorMessage::EscalationAlert { .. }
                | MonitorMessage::StatusSnapshot { .. }
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionInfo;

    #[test]
    fn tagged_by_type() {
        let json = serde_json::to_value(MonitorMessage::pong()).unwrap();
        assert_eq!(json["type"], "pong");

        let json = serde_json::to_value(MonitorMessage::camera_check("s-1")).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["action"], "check_camera");
    }

    #[test]
    fn kind_matches_wire_tag() {
        let snap = SessionSnapshot::new(SessionInfo::new("s", "u", "e", "a"));
        let messages = [
            MonitorMessage::status_update(&snap),
            MonitorMessage::status_snapshot(&snap),
            MonitorMessage::critical_warning("s"),
            MonitorMessage::escalation_alert("s", "excessive_alerts"),
            MonitorMessage::error("s", "invalid_action", "unknown command"),
            MonitorMessage::ProctorWarn {
                session_id: "s".into(),
                proctor_id: "p".into(),
                reason: "eyes on screen".into(),
                timestamp: Utc::now(),
            },
        ];
        for m in messages {
            let json = serde_json::to_value(&m).unwrap();
            assert_eq!(json["type"], m.kind());
        }
    }

    #[test]
    fn audience_split() {
        let snap = SessionSnapshot::new(SessionInfo::new("s", "u", "e", "a"));
        assert!(MonitorMessage::escalation_alert("s", "x").is_proctor_only());
        assert!(MonitorMessage::status_snapshot(&snap).is_proctor_only());
        assert!(!MonitorMessage::status_update(&snap).is_proctor_only());
        assert!(!MonitorMessage::critical_warning("s").is_proctor_only());
    }

    #[test]
    fn critical_warning_reports_termination_as_done() {
        let json = serde_json::to_value(MonitorMessage::critical_warning("s")).unwrap();
        let text = json["message"].as_str().unwrap();
        assert!(text.contains("has been terminated"));
        assert!(!text.contains("seconds"));
    }

    #[test]
    fn status_update_carries_counters() {
        let mut snap = SessionSnapshot::new(SessionInfo::new("s", "u", "e", "a"));
        snap.frames_processed = 4;
        snap.integrity_score = 0.7;
        let json = serde_json::to_value(MonitorMessage::status_update(&snap)).unwrap();
        assert_eq!(json["status"]["frames_processed"], 4);
        assert_eq!(json["status"]["integrity_score"], 0.7);
    }

    #[test]
    fn deserializes_from_wire() {
        let m = MonitorMessage::escalation_alert("s", "consecutive_violations");
        let back: MonitorMessage = serde_json::from_str(&m.to_json().unwrap()).unwrap();
        assert_eq!(back, m);
    }
}
