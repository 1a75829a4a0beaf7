//! End-to-end session flows through the registry, with fake oracles and an
//! in-memory audit log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sentinel_core::{
    ChannelSink, MessageSink, MonitorConfig, MonitorError, MonitorMessage, ProctorAction,
    SessionInfo, SessionRegistry, SessionStatus, Severity, SinkError, SubscriberRole,
    SubscriptionToken, ViolationType,
};
use sentinel_oracle::fakes::{FailingOracle, FailureMode, FixedOracle, ScriptedOracle, StallingOracle};
use sentinel_oracle::{AnalysisOracle, ConditionFlag, Judgment, SampleKind};
use sentinel_store::fakes::MemoryAuditLog;
use sentinel_store::{AuditKind, AuditLog};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn registry(oracle: impl AnalysisOracle + 'static) -> (SessionRegistry, Arc<MemoryAuditLog>) {
    registry_with(oracle, MonitorConfig::default())
}

fn registry_with(
    oracle: impl AnalysisOracle + 'static,
    config: MonitorConfig,
) -> (SessionRegistry, Arc<MemoryAuditLog>) {
    let audit = Arc::new(MemoryAuditLog::new());
    let registry = SessionRegistry::new(Arc::new(oracle), audit.clone(), config);
    (registry, audit)
}

fn info(id: &str) -> SessionInfo {
    SessionInfo::new(id, "student-1", "exam-7", "attempt-1")
}

async fn attach(
    registry: &SessionRegistry,
    session_id: &str,
    subscriber_id: &str,
    role: SubscriberRole,
) -> mpsc::Receiver<MonitorMessage> {
    attach_with_token(registry, session_id, subscriber_id, role).await.1
}

async fn attach_with_token(
    registry: &SessionRegistry,
    session_id: &str,
    subscriber_id: &str,
    role: SubscriberRole,
) -> (SubscriptionToken, mpsc::Receiver<MonitorMessage>) {
    let (sink, rx) = ChannelSink::new(256);
    let token = registry
        .subscribe(session_id, subscriber_id, role, Arc::new(sink))
        .await
        .unwrap();
    (token, rx)
}

/// Everything still buffered, waiting until the hub drops the sender.
async fn drain(rx: &mut mpsc::Receiver<MonitorMessage>) -> Vec<MonitorMessage> {
    let mut rest = Vec::new();
    while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        rest.push(msg);
    }
    rest
}

fn submit_frame(registry: &SessionRegistry, session_id: &str) {
    registry
        .submit_sample(session_id, SampleKind::Frame, Utc::now(), vec![0xff, 0xd8, 0xff])
        .unwrap();
}

/// Collect messages until one satisfies `done` (inclusive).
async fn collect_until(
    rx: &mut mpsc::Receiver<MonitorMessage>,
    wait: Duration,
    done: impl Fn(&MonitorMessage) -> bool,
) -> Vec<MonitorMessage> {
    let mut seen = Vec::new();
    loop {
        let msg = tokio::time::timeout(wait, rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("sink closed before expected message");
        let stop = done(&msg);
        seen.push(msg);
        if stop {
            return seen;
        }
    }
}

fn frames_processed(msg: &MonitorMessage) -> Option<u64> {
    match msg {
        MonitorMessage::StatusUpdate { status, .. } => Some(status.frames_processed),
        _ => None,
    }
}

fn kinds(messages: &[MonitorMessage]) -> Vec<&'static str> {
    messages.iter().map(|m| m.kind()).collect()
}

#[tokio::test]
async fn zero_face_sample_terminates_session() {
    let (registry, _audit) = registry(FixedOracle::new(Judgment::frame(0)));
    registry.start_session(info("s-zero")).await.unwrap();
    let mut proctor = attach(&registry, "s-zero", "proctor-1", SubscriberRole::Proctor).await;

    submit_frame(&registry, "s-zero");
    let seen = collect_until(&mut proctor, WAIT, |m| m.kind() == "session_ended").await;

    let alert = seen
        .iter()
        .find_map(|m| match m {
            MonitorMessage::LiveAlert { alerts, .. } => alerts.first().cloned(),
            _ => None,
        })
        .expect("live_alert");
    assert_eq!(alert.violations, vec![ViolationType::NoFaceDetected]);
    assert_eq!(alert.severity, Severity::Critical);

    assert!(seen.iter().any(|m| matches!(
        m,
        MonitorMessage::EscalationAlert { reason, .. } if reason == "critical_violation_detected"
    )));
    match seen.last().unwrap() {
        MonitorMessage::SessionEnded { final_status, .. } => {
            assert_eq!(*final_status, SessionStatus::Terminated)
        }
        other => panic!("unexpected {other:?}"),
    }

    let status = registry.get_status("s-zero").unwrap();
    assert_eq!(status.status, SessionStatus::Terminated);
    assert_eq!(status.frames_processed, 1);
    assert!((status.integrity_score - 0.7).abs() < 1e-9);
    assert!(!registry.is_active("s-zero"));

    let err = registry
        .submit_sample("s-zero", SampleKind::Frame, Utc::now(), vec![1])
        .unwrap_err();
    assert!(matches!(err, MonitorError::SessionNotFound(id) if id == "s-zero"));
}

#[tokio::test]
async fn five_clean_samples_complete_without_alerts() {
    let (registry, _audit) = registry(FixedOracle::clean());
    registry.start_session(info("s-clean")).await.unwrap();
    let mut subject = attach(&registry, "s-clean", "subject", SubscriberRole::Subject).await;

    for _ in 0..5 {
        submit_frame(&registry, "s-clean");
    }
    let seen = collect_until(&mut subject, WAIT, |m| frames_processed(m) == Some(5)).await;
    assert!(!kinds(&seen).contains(&"live_alert"));

    let summary = registry.end_session("s-clean", "submitted").await.unwrap();
    assert_eq!(summary.final_status, SessionStatus::Completed);
    assert_eq!(summary.frames_processed, 5);
    assert_eq!(summary.alerts_generated, 0);
    assert_eq!(summary.integrity_score, 1.0);
    assert_eq!(summary.end_reason.as_deref(), Some("submitted"));

    let last = collect_until(&mut subject, WAIT, |m| m.kind() == "session_ended").await;
    assert_eq!(last.last().unwrap().kind(), "session_ended");
}

#[tokio::test]
async fn end_and_terminate_are_idempotent() {
    let (registry, _audit) = registry(FixedOracle::clean());
    registry.start_session(info("s-idem")).await.unwrap();
    let mut proctor = attach(&registry, "s-idem", "proctor-1", SubscriberRole::Proctor).await;

    registry
        .proctor_action("s-idem", ProctorAction::Terminate, "proctor-1", Some("impersonation"))
        .await
        .unwrap();
    registry
        .proctor_action("s-idem", ProctorAction::Terminate, "proctor-1", None)
        .await
        .unwrap();

    let first = registry.end_session("s-idem", "submitted").await.unwrap();
    let second = registry.end_session("s-idem", "again").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.final_status, SessionStatus::Terminated);
    assert_eq!(first.end_reason.as_deref(), Some("impersonation"));
    assert_eq!(registry.active_count(), 0);

    let seen = drain(&mut proctor).await;
    let ended: Vec<_> = seen.iter().filter(|m| m.kind() == "session_ended").collect();
    assert_eq!(ended.len(), 1, "{:?}", kinds(&seen));
    assert_eq!(seen.last().unwrap().kind(), "session_ended");
}

#[tokio::test]
async fn start_is_idempotent_and_ended_sessions_stay_ended() {
    let (registry, _audit) = registry(FixedOracle::clean());
    let first = registry.start_session(info("s-start")).await.unwrap();
    let again = registry.start_session(info("s-start")).await.unwrap();
    assert_eq!(first.status, SessionStatus::Active);
    assert_eq!(first.created_at, again.created_at);
    assert_eq!(registry.active_count(), 1);

    registry.end_session("s-start", "submitted").await.unwrap();
    let err = registry.start_session(info("s-start")).await.unwrap_err();
    assert!(matches!(err, MonitorError::SessionEnded { status, .. } if status == "completed"));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let (registry, _audit) = registry(FixedOracle::clean());
    let err = registry
        .submit_sample("nope", SampleKind::Frame, Utc::now(), vec![])
        .unwrap_err();
    assert!(matches!(err, MonitorError::SessionNotFound(id) if id == "nope"));
    assert!(matches!(
        registry.end_session("nope", "x").await,
        Err(MonitorError::SessionNotFound(_))
    ));
    assert!(matches!(
        registry.get_status("nope"),
        Err(MonitorError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn full_queue_evicts_oldest() {
    let config = MonitorConfig::default()
        .with_queue_capacity(2)
        .with_oracle_timeout(Duration::from_secs(60));
    let (registry, _audit) = registry_with(StallingOracle, config);
    registry.start_session(info("s-full")).await.unwrap();

    // no await between submissions: the loop cannot dequeue in between
    let receipts: Vec<_> = (0..5)
        .map(|_| {
            registry
                .submit_sample("s-full", SampleKind::Frame, Utc::now(), vec![0])
                .unwrap()
        })
        .collect();

    let outcomes: Vec<&str> = receipts.iter().map(|r| r.outcome.as_str()).collect();
    assert_eq!(outcomes, vec!["accepted", "accepted", "dropped", "dropped", "dropped"]);
    assert!(receipts.iter().all(|r| r.outcome.depth() == 2 || !r.is_dropped()));

    let ack = receipts[4].frame_ack("s-full");
    let json = serde_json::to_value(&ack).unwrap();
    assert_eq!(json["type"], "frame_ack");
    assert_eq!(json["status"], "dropped");
    assert_eq!(json["queue_size"], 2);
}

#[tokio::test]
async fn repeated_gaze_escalates_and_ends_flagged() {
    let gaze = Judgment::frame(1).with_flag(ConditionFlag::GazeAway);
    let oracle = ScriptedOracle::judgments(vec![gaze; 4]);
    let (registry, _audit) = registry(oracle);
    registry.start_session(info("s-gaze")).await.unwrap();
    let mut proctor = attach(&registry, "s-gaze", "proctor-1", SubscriberRole::Proctor).await;
    let mut subject = attach(&registry, "s-gaze", "subject", SubscriberRole::Subject).await;

    for _ in 0..4 {
        submit_frame(&registry, "s-gaze");
    }
    let seen = collect_until(&mut proctor, WAIT, |m| frames_processed(m) == Some(4)).await;

    let escalations: Vec<&str> = seen
        .iter()
        .filter_map(|m| match m {
            MonitorMessage::EscalationAlert { reason, .. } => Some(reason.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(escalations, vec!["consecutive_violations"]);
    assert_eq!(kinds(&seen).iter().filter(|k| **k == "live_alert").count(), 4);

    let subject_seen = collect_until(&mut subject, WAIT, |m| frames_processed(m) == Some(4)).await;
    assert!(subject_seen.iter().all(|m| !m.is_proctor_only()));

    let summary = registry.end_session("s-gaze", "submitted").await.unwrap();
    assert_eq!(summary.final_status, SessionStatus::Flagged);
    assert_eq!(summary.alerts_generated, 4);

    let status = registry.get_status("s-gaze").unwrap();
    assert_eq!(status.recent_alerts.len(), 4);
}

#[tokio::test]
async fn recent_alerts_are_capped() {
    let dim = Judgment::frame(1).with_flag(ConditionFlag::DarkLighting);
    let (registry, _audit) = registry(FixedOracle::new(dim));
    registry.start_session(info("s-cap")).await.unwrap();
    let mut proctor = attach(&registry, "s-cap", "proctor-1", SubscriberRole::Proctor).await;

    for _ in 0..7 {
        submit_frame(&registry, "s-cap");
    }
    collect_until(&mut proctor, WAIT, |m| frames_processed(m) == Some(7)).await;

    let status = registry.get_status("s-cap").unwrap();
    assert_eq!(status.alerts_generated, 7);
    assert_eq!(status.recent_alerts.len(), 5);
    assert!((status.integrity_score - 0.93).abs() < 1e-9);
}

#[tokio::test]
async fn oracle_failure_degrades_without_violations() {
    let (registry, _audit) = registry(FailingOracle::new(FailureMode::Unavailable));
    registry.start_session(info("s-degraded")).await.unwrap();
    let mut proctor = attach(&registry, "s-degraded", "proctor-1", SubscriberRole::Proctor).await;

    submit_frame(&registry, "s-degraded");
    let seen = collect_until(&mut proctor, WAIT, |m| frames_processed(m) == Some(1)).await;
    match seen.last().unwrap() {
        MonitorMessage::StatusUpdate { status, .. } => {
            assert!(status.analysis_degraded);
            assert_eq!(status.violations_detected, 0);
            assert_eq!(status.integrity_score, 1.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!kinds(&seen).contains(&"live_alert"));

    let summary = registry.end_session("s-degraded", "submitted").await.unwrap();
    assert_eq!(summary.final_status, SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn silence_triggers_camera_check() {
    let (registry, _audit) = registry(FixedOracle::clean());
    registry.start_session(info("s-quiet")).await.unwrap();
    let mut subject = attach(&registry, "s-quiet", "subject", SubscriberRole::Subject).await;

    let seen = collect_until(&mut subject, Duration::from_secs(120), |m| m.kind() == "warning").await;
    match seen.last().unwrap() {
        MonitorMessage::Warning { action, .. } => assert_eq!(action, "check_camera"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(registry.is_active("s-quiet"));
}

struct BrokenSink;

#[async_trait]
impl MessageSink for BrokenSink {
    async fn send(&self, _message: &MonitorMessage) -> Result<(), SinkError> {
        Err(SinkError::Other("connection reset".into()))
    }
}

#[tokio::test]
async fn failing_subscriber_does_not_starve_others() {
    let (registry, _audit) = registry(FixedOracle::new(Judgment::frame(2)));
    registry.start_session(info("s-iso")).await.unwrap();
    registry
        .subscribe("s-iso", "broken", SubscriberRole::Proctor, Arc::new(BrokenSink))
        .await
        .unwrap();
    let mut proctor = attach(&registry, "s-iso", "proctor-1", SubscriberRole::Proctor).await;

    submit_frame(&registry, "s-iso");
    let seen = collect_until(&mut proctor, WAIT, |m| m.kind() == "session_ended").await;
    assert!(kinds(&seen).contains(&"live_alert"));
    assert!(kinds(&seen).contains(&"critical_warning"));
}

#[tokio::test]
async fn proctor_attach_gets_snapshot_first() {
    let (registry, _audit) = registry(FixedOracle::clean());
    registry.start_session(info("s-attach")).await.unwrap();
    let mut proctor = attach(&registry, "s-attach", "proctor-1", SubscriberRole::Proctor).await;
    let (token, mut subject) =
        attach_with_token(&registry, "s-attach", "subject", SubscriberRole::Subject).await;

    assert_eq!(proctor.recv().await.unwrap().kind(), "session_status");
    assert_eq!(proctor.recv().await.unwrap().kind(), "status_update");
    assert_eq!(subject.recv().await.unwrap().kind(), "status_update");

    assert!(registry.unsubscribe("s-attach", "subject", token).await);
    assert!(!registry.unsubscribe("s-attach", "subject", token).await);
}

#[tokio::test]
async fn late_detach_of_old_connection_keeps_reconnected_one() {
    let (registry, _audit) = registry(FixedOracle::clean());
    registry.start_session(info("s-reconnect")).await.unwrap();
    let (old_token, _old) =
        attach_with_token(&registry, "s-reconnect", "subject", SubscriberRole::Subject).await;
    let (_, mut fresh) =
        attach_with_token(&registry, "s-reconnect", "subject", SubscriberRole::Subject).await;

    // the dropped socket's cleanup lands after the reconnect
    assert!(!registry.unsubscribe("s-reconnect", "subject", old_token).await);

    registry
        .proctor_action("s-reconnect", ProctorAction::Warn, "proctor-1", Some("look up"))
        .await
        .unwrap();
    let seen = collect_until(&mut fresh, WAIT, |m| m.kind() == "proctor_warn").await;
    assert_eq!(seen.last().unwrap().kind(), "proctor_warn");
}

#[tokio::test]
async fn manual_warn_and_escalate() {
    let (registry, _audit) = registry(FixedOracle::clean());
    registry.start_session(info("s-manual")).await.unwrap();
    let mut subject = attach(&registry, "s-manual", "subject", SubscriberRole::Subject).await;

    registry
        .proctor_action("s-manual", ProctorAction::Warn, "proctor-1", Some("eyes on screen"))
        .await
        .unwrap();
    let seen = collect_until(&mut subject, WAIT, |m| m.kind() == "proctor_warn").await;
    match seen.last().unwrap() {
        MonitorMessage::ProctorWarn { reason, proctor_id, .. } => {
            assert_eq!(reason, "eyes on screen");
            assert_eq!(proctor_id, "proctor-1");
        }
        other => panic!("unexpected {other:?}"),
    }

    registry
        .proctor_action("s-manual", ProctorAction::Escalate, "proctor-1", None)
        .await
        .unwrap();
    collect_until(&mut subject, WAIT, |m| m.kind() == "proctor_escalate").await;

    // the tracker is untouched by a manual escalation
    let status = registry.get_status("s-manual").unwrap();
    assert_eq!(status.integrity_score, 1.0);
    assert_eq!(status.alerts_generated, 0);

    let summary = registry.end_session("s-manual", "submitted").await.unwrap();
    assert_eq!(summary.final_status, SessionStatus::Flagged);

    let err = registry
        .proctor_action("s-manual", ProctorAction::Warn, "proctor-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::SessionEnded { .. }));
}

#[tokio::test]
async fn audit_trail_records_the_session() {
    let (registry, audit) = registry(FixedOracle::new(Judgment::frame(0)));
    registry.start_session(info("s-audit")).await.unwrap();
    let mut proctor = attach(&registry, "s-audit", "proctor-1", SubscriberRole::Proctor).await;

    submit_frame(&registry, "s-audit");
    collect_until(&mut proctor, WAIT, |m| m.kind() == "session_ended").await;
    registry.flush_audit().await;

    let rows = audit.records_for("s-audit").await.unwrap();
    let row_kinds: Vec<AuditKind> = rows.iter().map(|r| r.kind).collect();
    assert_eq!(
        row_kinds,
        vec![
            AuditKind::SessionStarted,
            AuditKind::SampleAnalyzed,
            AuditKind::ViolationRecorded,
            AuditKind::AlertRaised,
            AuditKind::SessionEnded,
        ]
    );
    assert_eq!(rows.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

    let sample_row = &rows[1].payload;
    assert_eq!(sample_row["payload_len"], 3);
    assert_eq!(sample_row["payload_digest"].as_str().unwrap().len(), 64);
    assert_eq!(rows[4].payload["final_status"], "terminated");
}

#[tokio::test]
async fn shutdown_ends_live_sessions() {
    let (registry, audit) = registry(FixedOracle::clean());
    registry.start_session(info("s-a")).await.unwrap();
    registry.start_session(info("s-b")).await.unwrap();

    registry.shutdown().await;
    assert_eq!(registry.active_count(), 0);

    let status = registry.get_status("s-a").unwrap();
    assert_eq!(status.status, SessionStatus::Completed);
    let summary = registry.end_session("s-b", "late").await.unwrap();
    assert_eq!(summary.end_reason.as_deref(), Some("server_shutdown"));

    let sessions = audit.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
}
