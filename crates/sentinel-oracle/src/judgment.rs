//! Judgments and verdict parsing.
//!
//! A [`Judgment`] is the structured result of analyzing one sample. It is
//! produced once and never mutated. [`parse_verdict`] converts the raw JSON
//! verdict an analysis service returns into a judgment, accepting both a flat
//! layout and one with flags nested under `"analysis"`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};

/// Confidence attached to the fallback judgment.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Confidence below which an explicit negative liveness result counts as
/// a failed check.
pub const LIVENESS_THRESHOLD: f64 = 0.5;

/// Named boolean conditions an analysis can assert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionFlag {
    // identity
    IdentityMismatch,
    /// Spoofing or a presentation attack (photo, replayed video, mask)
    PresentationAttack,
    LivenessFailed,
    FaceObscured,
    // devices
    PhoneVisible,
    TabletVisible,
    OtherDeviceVisible,
    // materials and screens
    ReadingFromPaper,
    OtherScreensVisible,
    // gaze and head
    GazeAway,
    HeadTiltedAway,
    LookingDown,
    // gestures
    SuspiciousHandGesture,
    ObjectInMouth,
    // posture
    UnusualBodyPosition,
    ExtremeHeadAngle,
    // environment
    BrightLightGlare,
    DarkLighting,
    // audio
    ConversationDetected,
    MultipleVoices,
    WhisperDetected,
    ExternalCommunication,
    PhoneRinging,
}

/// Structured outcome of analyzing one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    /// Faces seen in a frame. `None` asserts nothing (audio, or a fallback).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces: Option<u32>,
    /// Distinct speakers heard in an audio chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speakers: Option<u32>,
    #[serde(default)]
    pub flags: BTreeSet<ConditionFlag>,
    /// Overall suspicion in [0, 1]
    #[serde(default)]
    pub suspicion_score: f64,
    /// Analyzer confidence in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

impl Judgment {
    /// The judgment substituted when analysis fails: asserts no entity
    /// counts and no flags, with reduced confidence.
    pub fn conservative_default() -> Self {
        Self {
            faces: None,
            speakers: None,
            flags: BTreeSet::new(),
            suspicion_score: 0.0,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    /// A frame judgment with the given face count and nothing else asserted.
    pub fn frame(faces: u32) -> Self {
        Self {
            faces: Some(faces),
            confidence: 0.9,
            ..Self::conservative_default()
        }
    }

    /// An audio judgment with the given speaker count.
    pub fn audio(speakers: u32) -> Self {
        Self {
            speakers: Some(speakers),
            confidence: 0.9,
            ..Self::conservative_default()
        }
    }

    pub fn with_flag(mut self, flag: ConditionFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_suspicion(mut self, score: f64) -> Self {
        self.suspicion_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn has(&self, flag: ConditionFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn has_any(&self, flags: &[ConditionFlag]) -> bool {
        flags.iter().any(|f| self.flags.contains(f))
    }
}

// ---------------------------------------------------------------------------
// Verdict parsing
// ---------------------------------------------------------------------------

/// Flag fields as an analysis service names them.
#[derive(Debug, Default, Deserialize)]
struct RawFlags {
    #[serde(default, alias = "identity_mismatch_detected")]
    identity_mismatch: bool,
    #[serde(default)]
    identity_risk: bool,
    #[serde(default)]
    spoofing_detected: bool,
    #[serde(default, alias = "presentation_attack_detected")]
    presentation_attack: bool,
    #[serde(default)]
    spoofing_risk: bool,
    /// Only an explicit `false` counts; absence asserts nothing
    #[serde(default)]
    liveness_detected: Option<bool>,
    #[serde(default)]
    liveness_score: Option<f64>,
    #[serde(default, alias = "masked_face_detected")]
    mask_detected: bool,
    #[serde(default, alias = "face_covered_detected")]
    face_covered: bool,
    #[serde(default)]
    face_obscured: bool,
    #[serde(default)]
    phone_detected: bool,
    #[serde(default)]
    tablet_detected: bool,
    #[serde(default)]
    other_device_detected: bool,
    #[serde(default)]
    reading_from_paper: bool,
    #[serde(default)]
    other_screens_visible: bool,
    #[serde(default)]
    looking_away: bool,
    #[serde(default)]
    head_tilted_away: bool,
    #[serde(default)]
    looking_down: bool,
    #[serde(default)]
    suspicious_hand_gesture: bool,
    #[serde(default)]
    object_in_mouth: bool,
    #[serde(default)]
    unusual_body_position: bool,
    #[serde(default)]
    extreme_head_angle: bool,
    #[serde(default)]
    bright_light_glare: bool,
    #[serde(default)]
    dark_lighting: bool,
    #[serde(default)]
    conversation: bool,
    #[serde(default)]
    multiple_voices: bool,
    #[serde(default)]
    whisper: bool,
    #[serde(default)]
    external_comm: bool,
    #[serde(default)]
    phone_ring: bool,
    #[serde(default, alias = "violation_prob")]
    overall_suspicion_score: Option<f64>,
}

impl RawFlags {
    fn collect_into(&self, out: &mut BTreeSet<ConditionFlag>) {
        use ConditionFlag::*;
        let table = [
            (self.identity_mismatch || self.identity_risk, IdentityMismatch),
            (
                self.spoofing_detected || self.presentation_attack || self.spoofing_risk,
                PresentationAttack,
            ),
            (self.liveness_failed(), LivenessFailed),
            (
                self.mask_detected || self.face_covered || self.face_obscured,
                FaceObscured,
            ),
            (self.phone_detected, PhoneVisible),
            (self.tablet_detected, TabletVisible),
            (self.other_device_detected, OtherDeviceVisible),
            (self.reading_from_paper, ReadingFromPaper),
            (self.other_screens_visible, OtherScreensVisible),
            (self.looking_away, GazeAway),
            (self.head_tilted_away, HeadTiltedAway),
            (self.looking_down, LookingDown),
            (self.suspicious_hand_gesture, SuspiciousHandGesture),
            (self.object_in_mouth, ObjectInMouth),
            (self.unusual_body_position, UnusualBodyPosition),
            (self.extreme_head_angle, ExtremeHeadAngle),
            (self.bright_light_glare, BrightLightGlare),
            (self.dark_lighting, DarkLighting),
            (self.conversation, ConversationDetected),
            (self.multiple_voices, MultipleVoices),
            (self.whisper, WhisperDetected),
            (self.external_comm, ExternalCommunication),
            (self.phone_ring, PhoneRinging),
        ];
        out.extend(table.into_iter().filter(|(set, _)| *set).map(|(_, f)| f));
    }

    fn liveness_failed(&self) -> bool {
        self.liveness_detected == Some(false)
            && self
                .liveness_score
                .map_or(true, |score| score < LIVENESS_THRESHOLD)
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default, alias = "faces")]
    faces_detected: Option<u32>,
    #[serde(default, alias = "speakers")]
    num_speakers: Option<u32>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    analysis: Option<RawFlags>,
    #[serde(flatten)]
    top: RawFlags,
}

/// Strip a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn unit_interval(name: &str, value: f64) -> OracleResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(OracleError::Malformed(format!(
            "{name} {value} is outside [0, 1]"
        )))
    }
}

/// Parse an analysis service verdict into a [`Judgment`].
///
/// Fails with [`OracleError::Malformed`] when the body is not a JSON object
/// or a score lies outside [0, 1].
pub fn parse_verdict(body: &str) -> OracleResult<Judgment> {
    let json = strip_code_fence(body);
    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|e| OracleError::Malformed(format!("invalid verdict JSON: {e}")))?;

    let mut flags = BTreeSet::new();
    raw.top.collect_into(&mut flags);
    if let Some(nested) = &raw.analysis {
        nested.collect_into(&mut flags);
    }

    let suspicion = raw
        .analysis
        .as_ref()
        .and_then(|a| a.overall_suspicion_score)
        .or(raw.top.overall_suspicion_score)
        .unwrap_or(0.0);

    Ok(Judgment {
        faces: raw.faces_detected,
        speakers: raw.num_speakers,
        flags,
        suspicion_score: unit_interval("suspicion score", suspicion)?,
        confidence: unit_interval("confidence", raw.confidence.unwrap_or(DEFAULT_CONFIDENCE))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_analysis_layout() {
        let body = r#"{
            "faces_detected": 1,
            "confidence": 0.82,
            "analysis": {
                "phone_detected": true,
                "looking_down": true,
                "overall_suspicion_score": 0.7
            }
        }"#;
        let j = parse_verdict(body).unwrap();
        assert_eq!(j.faces, Some(1));
        assert!(j.has(ConditionFlag::PhoneVisible));
        assert!(j.has(ConditionFlag::LookingDown));
        assert_eq!(j.flags.len(), 2);
        assert!((j.suspicion_score - 0.7).abs() < f64::EPSILON);
        assert!((j.confidence - 0.82).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_flat_layout_and_audio_aliases() {
        let body = r#"{"num_speakers": 2, "whisper": true, "violation_prob": 0.4}"#;
        let j = parse_verdict(body).unwrap();
        assert_eq!(j.faces, None);
        assert_eq!(j.speakers, Some(2));
        assert!(j.has(ConditionFlag::WhisperDetected));
        assert!((j.suspicion_score - 0.4).abs() < f64::EPSILON);
        assert!((j.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_identity_checks() {
        let body = r#"{
            "faces_detected": 1,
            "identity_mismatch_detected": true,
            "analysis": {"presentation_attack_detected": true, "mask_detected": true}
        }"#;
        let j = parse_verdict(body).unwrap();
        assert!(j.has(ConditionFlag::IdentityMismatch));
        assert!(j.has(ConditionFlag::PresentationAttack));
        assert!(j.has(ConditionFlag::FaceObscured));
        assert!(!j.has(ConditionFlag::LivenessFailed));
    }

    #[test]
    fn liveness_needs_an_explicit_negative() {
        let failed = parse_verdict(r#"{"liveness_detected": false, "liveness_score": 0.2}"#).unwrap();
        assert!(failed.has(ConditionFlag::LivenessFailed));

        let unscored = parse_verdict(r#"{"liveness_detected": false}"#).unwrap();
        assert!(unscored.has(ConditionFlag::LivenessFailed));

        let borderline =
            parse_verdict(r#"{"liveness_detected": false, "liveness_score": 0.6}"#).unwrap();
        assert!(!borderline.has(ConditionFlag::LivenessFailed));

        // an analyzer that never reports liveness asserts nothing
        let silent = parse_verdict(r#"{"faces_detected": 1}"#).unwrap();
        assert!(silent.flags.is_empty());
    }

    #[test]
    fn strips_markdown_fence() {
        let body = "```json\n{\"faces_detected\": 0, \"confidence\": 0.9}\n```";
        let j = parse_verdict(body).unwrap();
        assert_eq!(j.faces, Some(0));
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_verdict("the student looks fine").unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let err = parse_verdict(r#"{"faces_detected": 1, "confidence": 1.5}"#).unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));

        let err = parse_verdict(r#"{"overall_suspicion_score": -0.1}"#).unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[test]
    fn default_asserts_nothing() {
        let j = Judgment::conservative_default();
        assert_eq!(j.faces, None);
        assert_eq!(j.speakers, None);
        assert!(j.flags.is_empty());
        assert!(j.confidence < Judgment::frame(1).confidence);
    }

    #[test]
    fn judgment_serializes_flags_by_name() {
        let j = Judgment::frame(1).with_flag(ConditionFlag::DarkLighting);
        let value = serde_json::to_value(&j).unwrap();
        assert_eq!(value["flags"][0], "dark_lighting");
        assert!(value.get("speakers").is_none());

        let back: Judgment = serde_json::from_value(value).unwrap();
        assert_eq!(back, j);
    }
}
