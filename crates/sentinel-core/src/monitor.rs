//! Per-session monitor loop.
//!
//! Each active session owns one background task. The task is the only
//! writer of the session's tracker and status; everything else reads the
//! published [`SessionSnapshot`] or talks to the task over its command
//! channel.
//!
//! One cycle:
//!
//! 1. wait for a sample (bounded by `sample_timeout`; a timeout sends the
//!    subject a camera check and the loop keeps waiting)
//! 2. analyze, detect, record
//! 3. bundle violations into an alert and queue audit rows
//! 4. evaluate escalation and publish the new snapshot
//! 5. broadcast alerts, escalation notices and the status update
//!
//! A sample already dequeued always completes its cycle; end requests are
//! picked up between cycles.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use sentinel_oracle::Sample;
use sentinel_store::{AuditKind, PayloadDigest};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::analysis::AnalysisClient;
use crate::audit::AuditWriter;
use crate::config::MonitorConfig;
use crate::detector::detect;
use crate::domain::{
    Alert, SessionInfo, SessionSnapshot, SessionStatus, SessionSummary, Violation,
};
use crate::escalation::{evaluate, EscalationAction, EscalationDecision, EscalationReason};
use crate::hub::AlertHub;
use crate::messages::MonitorMessage;
use crate::metrics::METRICS;
use crate::obs;
use crate::queue::{EnqueueOutcome, QueueClosed, SampleQueue};
use crate::tracker::ViolationTracker;

/// End reason recorded when the process shuts down under a live session.
pub const SHUTDOWN_REASON: &str = "server_shutdown";

/// How a session should be brought to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndRequest {
    /// Normal end: `flagged` if the session was ever escalated, else `completed`
    Finish,
    /// Forced end: always `terminated`
    Terminate,
}

/// Called once with the final snapshot after the loop has shut the session down.
pub(crate) type RetireFn = Box<dyn FnOnce(SessionSnapshot) + Send + Sync + 'static>;

enum Command {
    End {
        request: EndRequest,
        reason: String,
        reply: oneshot::Sender<SessionSummary>,
    },
    MarkEscalated,
}

/// Shared collaborators every monitor loop needs.
#[derive(Clone)]
pub struct MonitorContext {
    pub analysis: AnalysisClient,
    pub audit: AuditWriter,
    pub config: Arc<MonitorConfig>,
    /// Process-wide shutdown signal
    pub shutdown: CancellationToken,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running session loop.
pub struct SessionMonitor {
    info: SessionInfo,
    queue: Arc<SampleQueue>,
    hub: Arc<AlertHub>,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionMonitor {
    /// Spawn the loop for `info`. Must be called from within a tokio runtime.
    pub(crate) fn spawn(info: SessionInfo, ctx: MonitorContext, on_retire: RetireFn) -> Self {
        let queue = Arc::new(SampleQueue::new(ctx.config.queue_capacity));
        let hub = Arc::new(AlertHub::new(info.session_id.clone()));
        let (command_tx, command_rx) = mpsc::channel(8);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::new(info.clone()));

        let span = obs::session_span(&info.session_id);
        let worker = MonitorLoop {
            state: SessionSnapshot::new(info.clone()),
            tracker: ViolationTracker::new(),
            queue: Arc::clone(&queue),
            hub: Arc::clone(&hub),
            commands: command_rx,
            snapshot: snapshot_tx,
            ctx,
            on_retire: Some(on_retire),
        };
        let task = tokio::spawn(worker.run().instrument(span));

        Self {
            info,
            queue,
            hub,
            commands: command_tx,
            snapshot: snapshot_rx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    pub fn hub(&self) -> &Arc<AlertHub> {
        &self.hub
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Wait until the loop has left `initializing`.
    pub async fn wait_started(&self) -> SessionSnapshot {
        let mut rx = self.snapshot.clone();
        let result = rx
            .wait_for(|s| s.status != SessionStatus::Initializing)
            .await
            .map(|s| s.clone());
        match result {
            Ok(snapshot) => snapshot,
            // loop already gone; the last published value is all there is
            Err(_) => self.snapshot(),
        }
    }

    pub fn submit(&self, sample: Sample) -> Result<EnqueueOutcome, QueueClosed> {
        self.queue.enqueue(sample)
    }

    /// Ask the loop to end the session. `None` if the loop had already
    /// stopped before it could answer.
    pub async fn end(&self, request: EndRequest, reason: &str) -> Option<SessionSummary> {
        let (reply, rx) = oneshot::channel();
        let command = Command::End {
            request,
            reason: reason.to_string(),
            reply,
        };
        self.commands.send(command).await.ok()?;
        rx.await.ok()
    }

    /// Mark the session escalated without touching the tracker.
    pub async fn mark_escalated(&self) -> bool {
        self.commands.send(Command::MarkEscalated).await.is_ok()
    }

    /// Wait for the loop task to exit.
    pub async fn join(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(session_id = %self.info.session_id, error = %e, "monitor task failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

struct MonitorLoop {
    state: SessionSnapshot,
    tracker: ViolationTracker,
    queue: Arc<SampleQueue>,
    hub: Arc<AlertHub>,
    commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
    ctx: MonitorContext,
    on_retire: Option<RetireFn>,
}

impl MonitorLoop {
    async fn run(mut self) {
        self.state.status = SessionStatus::Active;
        self.publish();

        let info = self.state.info.clone();
        obs::emit_session_started(&info.session_id, &info.subject_id, &info.exam_id);
        METRICS.inc_sessions_started();
        self.ctx.audit.record(
            &info.session_id,
            AuditKind::SessionStarted,
            json!({
                "subject_id": info.subject_id,
                "exam_id": info.exam_id,
                "attempt_id": info.attempt_id,
                "created_at": self.state.created_at,
            }),
        );

        let sample_timeout = self.ctx.config.sample_timeout;
        let shutdown = self.ctx.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.finish(EndRequest::Finish, SHUTDOWN_REASON).await;
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(Command::End { request, reason, reply }) => {
                        let summary = self.finish(request, &reason).await;
                        let _ = reply.send(summary);
                        break;
                    }
                    Some(Command::MarkEscalated) => {
                        self.state.escalated = true;
                        self.publish();
                    }
                    None => {
                        // every handle is gone; nobody can end this session any more
                        self.finish(EndRequest::Finish, "monitor_released").await;
                        break;
                    }
                },

                next = tokio::time::timeout(sample_timeout, self.queue.dequeue()) => match next {
                    Ok(Some(sample)) => {
                        let decision = self.process(sample).await;
                        if decision.is_terminal() {
                            let reason = decision
                                .reason
                                .unwrap_or(EscalationReason::CriticalViolationDetected);
                            self.finish(EndRequest::Terminate, reason.as_str()).await;
                            break;
                        }
                    }
                    Ok(None) => {
                        self.finish(EndRequest::Finish, "queue_closed").await;
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(timeout_ms = sample_timeout.as_millis() as u64, "no sample received");
                        self.hub
                            .broadcast(&MonitorMessage::camera_check(&self.state.info.session_id))
                            .await;
                    }
                },
            }
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.state.clone());
    }

    async fn process(&mut self, sample: Sample) -> EscalationDecision {
        let session_id = self.state.info.session_id.clone();
        let sample_id = sample.sample_id.to_string();
        let kind = sample.kind;
        let now = Utc::now();

        let analysis = self.ctx.analysis.analyze(&sample).await;
        self.state.frames_processed += 1;
        self.state.analysis_degraded = analysis.is_degraded();
        if let Some(fault) = &analysis.fault {
            self.state.degraded_cycles += 1;
            obs::emit_analysis_degraded(&session_id, &sample_id, fault.code(), fault);
        }
        METRICS.inc_analyzed(analysis.is_degraded());

        let violations = detect(&analysis.judgment);
        self.tracker.record(&violations, now);
        self.state.violations_detected = self.tracker.occurrences();
        self.state.integrity_score = self.tracker.integrity_score();

        self.ctx.audit.record(
            &session_id,
            AuditKind::SampleAnalyzed,
            json!({
                "sample_id": sample_id,
                "kind": kind,
                "captured_at": sample.captured_at,
                "payload_digest": PayloadDigest::from_bytes(&sample.payload).as_str(),
                "payload_len": sample.payload.len(),
                "violations": violations,
                "degraded": analysis.fault.as_ref().map(|f| f.code()),
                "integrity_score": self.state.integrity_score,
            }),
        );

        let mut alert = None;
        if !violations.is_empty() {
            obs::emit_violations_detected(&session_id, &violations);
            for violation in &violations {
                let row = Violation::new(*violation, sample.sample_id, now);
                match serde_json::to_value(&row) {
                    Ok(row) => {
                        self.ctx.audit.record(&session_id, AuditKind::ViolationRecorded, row);
                    }
                    Err(e) => obs::emit_audit_failed(&session_id, &e),
                }
            }

            if let Some(bundled) =
                Alert::bundle(&session_id, sample.sample_id, &violations, &analysis.judgment, now)
            {
                self.tracker.record_alert();
                self.state.alerts_generated = self.tracker.alert_count();
                METRICS.inc_alerts();
                match serde_json::to_value(&bundled) {
                    Ok(row) => {
                        self.ctx.audit.record(&session_id, AuditKind::AlertRaised, row);
                    }
                    Err(e) => obs::emit_audit_failed(&session_id, &e),
                }
                self.push_recent(bundled.clone());
                alert = Some(bundled);
            }
        }
        drop(sample);

        let decision = evaluate(&self.tracker, &self.ctx.config.escalation);
        let announce_escalation =
            decision.action == EscalationAction::Escalate && !violations.is_empty();
        if announce_escalation {
            self.state.escalated = true;
        }

        obs::emit_sample_analyzed(
            &session_id,
            &sample_id,
            kind.as_str(),
            violations.len(),
            self.state.integrity_score,
        );
        self.publish();

        if let Some(alert) = alert {
            self.hub
                .broadcast(&MonitorMessage::LiveAlert {
                    session_id: session_id.clone(),
                    alerts: vec![alert],
                    integrity_score: self.state.integrity_score,
                    analysis_degraded: self.state.analysis_degraded,
                    timestamp: now,
                })
                .await;
        }

        match (decision.action, decision.reason) {
            (EscalationAction::Terminate, reason) => {
                let reason = reason.unwrap_or(EscalationReason::CriticalViolationDetected);
                obs::emit_escalation(&session_id, "terminate", reason.as_str());
                self.hub
                    .broadcast(&MonitorMessage::escalation_alert(&session_id, reason.as_str()))
                    .await;
                self.hub
                    .broadcast(&MonitorMessage::critical_warning(&session_id))
                    .await;
            }
            (EscalationAction::Escalate, Some(reason)) if announce_escalation => {
                obs::emit_escalation(&session_id, "escalate", reason.as_str());
                self.hub
                    .broadcast(&MonitorMessage::escalation_alert(&session_id, reason.as_str()))
                    .await;
            }
            _ => {}
        }

        self.hub
            .broadcast(&MonitorMessage::status_update(&self.state))
            .await;

        decision
    }

    fn push_recent(&mut self, alert: Alert) {
        let keep = self.ctx.config.recent_alerts.max(1);
        self.state.recent_alerts.push(alert);
        if self.state.recent_alerts.len() > keep {
            let excess = self.state.recent_alerts.len() - keep;
            self.state.recent_alerts.drain(..excess);
        }
    }

    async fn finish(&mut self, request: EndRequest, reason: &str) -> SessionSummary {
        if self.state.status.is_terminal() {
            return self.state.summary();
        }

        let status = match request {
            EndRequest::Terminate => SessionStatus::Terminated,
            EndRequest::Finish if self.state.escalated => SessionStatus::Flagged,
            EndRequest::Finish => SessionStatus::Completed,
        };
        let session_id = self.state.info.session_id.clone();
        let ended_at = Utc::now();

        self.state.status = status;
        self.state.ended_at = Some(ended_at);
        self.state.end_reason = Some(reason.to_string());
        self.publish();

        let discarded = self.queue.close();
        if discarded > 0 {
            tracing::debug!(discarded, "pending samples discarded at session end");
        }

        let summary = self.state.summary();
        match serde_json::to_value(&summary) {
            Ok(row) => {
                self.ctx.audit.record(&session_id, AuditKind::SessionEnded, row);
            }
            Err(e) => obs::emit_audit_failed(&session_id, &e),
        }
        obs::emit_session_ended(
            &session_id,
            status,
            reason,
            self.state.frames_processed,
            self.state.alerts_generated,
        );
        METRICS.inc_sessions_ended();

        if let Some(retire) = self.on_retire.take() {
            retire(self.state.clone());
        }

        self.hub
            .close(&MonitorMessage::SessionEnded {
                session_id,
                reason: reason.to_string(),
                final_status: status,
                timestamp: ended_at,
            })
            .await;

        summary
    }
}
