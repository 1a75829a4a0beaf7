//! Violation detection: a fixed, ordered rule table over a [`Judgment`].
//!
//! Pure and deterministic. Every matching rule contributes its type; the
//! result keeps table order and never repeats a type.

use sentinel_oracle::{ConditionFlag, Judgment};

use crate::domain::ViolationType;

struct Rule {
    violation: ViolationType,
    matches: fn(&Judgment) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        violation: ViolationType::NoFaceDetected,
        matches: |j| j.faces == Some(0),
    },
    Rule {
        violation: ViolationType::MultipleFacesDetected,
        matches: |j| j.faces.is_some_and(|n| n > 1),
    },
    Rule {
        violation: ViolationType::IdentityVerificationFailed,
        matches: |j| {
            j.has_any(&[
                ConditionFlag::IdentityMismatch,
                ConditionFlag::PresentationAttack,
                ConditionFlag::LivenessFailed,
            ])
        },
    },
    Rule {
        violation: ViolationType::FaceObscured,
        matches: |j| j.has(ConditionFlag::FaceObscured),
    },
    Rule {
        violation: ViolationType::UnauthorizedObjectDetected,
        matches: |j| {
            j.has_any(&[
                ConditionFlag::PhoneVisible,
                ConditionFlag::TabletVisible,
                ConditionFlag::OtherDeviceVisible,
            ])
        },
    },
    Rule {
        violation: ViolationType::ReadingFromPaper,
        matches: |j| j.has(ConditionFlag::ReadingFromPaper),
    },
    Rule {
        violation: ViolationType::TabSwitchingDetected,
        matches: |j| j.has(ConditionFlag::OtherScreensVisible),
    },
    Rule {
        violation: ViolationType::EyeGazeAway,
        matches: |j| {
            j.has_any(&[
                ConditionFlag::GazeAway,
                ConditionFlag::HeadTiltedAway,
                ConditionFlag::LookingDown,
            ])
        },
    },
    Rule {
        violation: ViolationType::SuspiciousGesture,
        matches: |j| {
            j.has_any(&[
                ConditionFlag::SuspiciousHandGesture,
                ConditionFlag::ObjectInMouth,
            ])
        },
    },
    Rule {
        violation: ViolationType::ExcessiveHeadMovement,
        matches: |j| {
            j.has_any(&[
                ConditionFlag::UnusualBodyPosition,
                ConditionFlag::ExtremeHeadAngle,
            ])
        },
    },
    Rule {
        violation: ViolationType::LightingChangeDetected,
        matches: |j| j.has_any(&[ConditionFlag::BrightLightGlare, ConditionFlag::DarkLighting]),
    },
    Rule {
        violation: ViolationType::AudioAnomaly,
        matches: |j| {
            j.speakers.is_some_and(|n| n > 1)
                || j.has_any(&[
                    ConditionFlag::ConversationDetected,
                    ConditionFlag::MultipleVoices,
                    ConditionFlag::WhisperDetected,
                    ConditionFlag::ExternalCommunication,
                    ConditionFlag::PhoneRinging,
                ])
        },
    },
];

/// All violation types the judgment triggers, in rule-table order.
pub fn detect(judgment: &Judgment) -> Vec<ViolationType> {
    RULES
        .iter()
        .filter(|rule| (rule.matches)(judgment))
        .map(|rule| rule.violation)
        .collect()
}
