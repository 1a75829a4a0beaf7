//! Structured observability hooks for session lifecycle events.
//!
//! - `SessionSpan`: RAII guard entering a session-scoped span
//! - `emit_*`: one function per lifecycle event, each logging an `event` field
//!
//! Filter with `SENTINEL_LOG` (or `RUST_LOG`); see [`crate::telemetry`].

use tracing::{info, warn};

use crate::domain::{SessionStatus, ViolationType};

/// RAII guard that enters a session-scoped tracing span.
///
/// ```ignore
/// let _span = SessionSpan::enter("sess-42");
/// // events below carry session_id = "sess-42"
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("sentinel.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Span for instrumenting a session's monitor task.
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("sentinel.session", session_id = %session_id)
}

pub fn emit_session_started(session_id: &str, subject_id: &str, exam_id: &str) {
    info!(
        event = "session.started",
        session_id = %session_id,
        subject_id = %subject_id,
        exam_id = %exam_id,
    );
}

pub fn emit_sample_analyzed(
    session_id: &str,
    sample_id: &str,
    kind: &str,
    violations: usize,
    integrity_score: f64,
) {
    info!(
        event = "sample.analyzed",
        session_id = %session_id,
        sample_id = %sample_id,
        kind = %kind,
        violations = violations,
        integrity_score = integrity_score,
    );
}

/// Analysis fell back to the default judgment (warning level).
pub fn emit_analysis_degraded(
    session_id: &str,
    sample_id: &str,
    code: &str,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "analysis.degraded",
        session_id = %session_id,
        sample_id = %sample_id,
        code = %code,
        error = %error,
    );
}

pub fn emit_violations_detected(session_id: &str, violations: &[ViolationType]) {
    let names: Vec<&str> = violations.iter().map(|v| v.name()).collect();
    info!(
        event = "violations.detected",
        session_id = %session_id,
        violations = ?names,
        count = violations.len(),
    );
}

pub fn emit_escalation(session_id: &str, action: &str, reason: &str) {
    warn!(
        event = "session.escalated",
        session_id = %session_id,
        action = %action,
        reason = %reason,
    );
}

pub fn emit_broadcast_failed(
    session_id: &str,
    subscriber_id: &str,
    message_kind: &str,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "broadcast.failed",
        session_id = %session_id,
        subscriber_id = %subscriber_id,
        message = %message_kind,
        error = %error,
    );
}

pub fn emit_audit_failed(session_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "audit.failed", session_id = %session_id, error = %error);
}

pub fn emit_session_ended(
    session_id: &str,
    status: SessionStatus,
    reason: &str,
    frames_processed: u64,
    alerts_generated: u64,
) {
    info!(
        event = "session.ended",
        session_id = %session_id,
        status = %status,
        reason = %reason,
        frames_processed = frames_processed,
        alerts_generated = alerts_generated,
    );
}
