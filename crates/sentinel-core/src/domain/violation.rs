//! The violation catalog.
//!
//! | Type | Severity | Score penalty |
//! |------|----------|---------------|
//! | `no_face_detected` | critical | 0.30 |
//! | `multiple_faces_detected` | critical | 0.30 |
//! | `identity_verification_failed` | critical | 0.30 |
//! | `face_obscured` | high | 0.15 |
//! | `unauthorized_object_detected` | high | 0.15 |
//! | `reading_from_paper` | high | 0.15 |
//! | `audio_anomaly` | high | 0.15 |
//! | `tab_switching_detected` | medium | 0.05 |
//! | `eye_gaze_away` | medium | 0.05 |
//! | `suspicious_gesture` | medium | 0.05 |
//! | `excessive_head_movement` | medium | 0.05 |
//! | `lighting_change_detected` | low | 0.01 |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a violation or alert, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Integrity-score penalty per recorded occurrence.
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Critical => 0.30,
            Severity::High => 0.15,
            Severity::Medium => 0.05,
            Severity::Low => 0.01,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every kind of violation the detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    NoFaceDetected,
    MultipleFacesDetected,
    IdentityVerificationFailed,
    FaceObscured,
    UnauthorizedObjectDetected,
    ReadingFromPaper,
    TabSwitchingDetected,
    EyeGazeAway,
    SuspiciousGesture,
    ExcessiveHeadMovement,
    LightingChangeDetected,
    AudioAnomaly,
}

impl ViolationType {
    pub const ALL: [ViolationType; 12] = [
        ViolationType::NoFaceDetected,
        ViolationType::MultipleFacesDetected,
        ViolationType::IdentityVerificationFailed,
        ViolationType::FaceObscured,
        ViolationType::UnauthorizedObjectDetected,
        ViolationType::ReadingFromPaper,
        ViolationType::TabSwitchingDetected,
        ViolationType::EyeGazeAway,
        ViolationType::SuspiciousGesture,
        ViolationType::ExcessiveHeadMovement,
        ViolationType::LightingChangeDetected,
        ViolationType::AudioAnomaly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ViolationType::NoFaceDetected => "no_face_detected",
            ViolationType::MultipleFacesDetected => "multiple_faces_detected",
            ViolationType::IdentityVerificationFailed => "identity_verification_failed",
            ViolationType::FaceObscured => "face_obscured",
            ViolationType::UnauthorizedObjectDetected => "unauthorized_object_detected",
            ViolationType::ReadingFromPaper => "reading_from_paper",
            ViolationType::TabSwitchingDetected => "tab_switching_detected",
            ViolationType::EyeGazeAway => "eye_gaze_away",
            ViolationType::SuspiciousGesture => "suspicious_gesture",
            ViolationType::ExcessiveHeadMovement => "excessive_head_movement",
            ViolationType::LightingChangeDetected => "lighting_change_detected",
            ViolationType::AudioAnomaly => "audio_anomaly",
        }
    }

    /// Static severity; never varies per occurrence.
    pub fn severity(&self) -> Severity {
        match self {
            ViolationType::NoFaceDetected
            | ViolationType::MultipleFacesDetected
            | ViolationType::IdentityVerificationFailed => Severity::Critical,
            ViolationType::FaceObscured
            | ViolationType::UnauthorizedObjectDetected
            | ViolationType::ReadingFromPaper
            | ViolationType::AudioAnomaly => Severity::High,
            ViolationType::TabSwitchingDetected
            | ViolationType::EyeGazeAway
            | ViolationType::SuspiciousGesture
            | ViolationType::ExcessiveHeadMovement => Severity::Medium,
            ViolationType::LightingChangeDetected => Severity::Low,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ViolationType::NoFaceDetected => "Test-taker's face not visible in frame",
            ViolationType::MultipleFacesDetected => "Multiple people detected in view",
            ViolationType::IdentityVerificationFailed => {
                "Face does not match the registered test-taker or failed liveness checks"
            }
            ViolationType::FaceObscured => "Test-taker's face is masked or covered",
            ViolationType::UnauthorizedObjectDetected => {
                "Phone, tablet, or other unauthorized device visible"
            }
            ViolationType::ReadingFromPaper => {
                "Test-taker appears to be reading from unauthorized materials"
            }
            ViolationType::TabSwitchingDetected => {
                "Multiple browser tabs or window switching detected"
            }
            ViolationType::EyeGazeAway => "Test-taker looking away from screen",
            ViolationType::SuspiciousGesture => "Hand gestures or suspicious movement detected",
            ViolationType::ExcessiveHeadMovement => {
                "Excessive head turning or unusual head angles"
            }
            ViolationType::LightingChangeDetected => "Lighting conditions changed significantly",
            ViolationType::AudioAnomaly => "Foreign voices or unusual sounds detected",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            ViolationType::NoFaceDetected => {
                "Terminate exam - cannot verify test-taker identity"
            }
            ViolationType::MultipleFacesDetected => "Terminate exam immediately",
            ViolationType::IdentityVerificationFailed => {
                "Terminate exam and escalate to manual identity review"
            }
            ViolationType::FaceObscured => "Send warning, request face be uncovered",
            ViolationType::UnauthorizedObjectDetected => {
                "Send warning, request removal of device"
            }
            ViolationType::ReadingFromPaper => "Send warning, request desk verification",
            ViolationType::TabSwitchingDetected => "Send warning, remind of single-tab policy",
            ViolationType::EyeGazeAway => "Continue monitoring with increased frequency",
            ViolationType::SuspiciousGesture => "Increase monitoring frequency",
            ViolationType::ExcessiveHeadMovement => {
                "Send warning, increase monitoring frequency"
            }
            ViolationType::LightingChangeDetected => "Monitor for intentional obstruction",
            ViolationType::AudioAnomaly => "Send warning, verify test-taker is alone",
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity() == Severity::Critical
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One detected violation, tied to the sample it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub sample_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

impl Violation {
    pub fn new(violation_type: ViolationType, sample_id: Uuid, detected_at: DateTime<Utc>) -> Self {
        Self {
            violation_type,
            severity: violation_type.severity(),
            sample_id,
            detected_at,
        }
    }
}
