//! Session registry: the control surface over every monitored session.
//!
//! The registry is the only structure shared across sessions. It maps
//! session ids to running [`SessionMonitor`]s and remembers a bounded number
//! of ended sessions so end, terminate and status calls stay answerable
//! after the loop has gone.
//!
//! Operations:
//!
//! - [`SessionRegistry::start_session`]: idempotent while the session is live
//! - [`SessionRegistry::submit_sample`]: never waits; reports accepted or dropped
//! - [`SessionRegistry::end_session`]: idempotent; repeated calls return the same summary
//! - [`SessionRegistry::get_status`]
//! - [`SessionRegistry::proctor_action`]: warn, escalate, terminate
//! - [`SessionRegistry::subscribe`] / [`SessionRegistry::unsubscribe`]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use sentinel_oracle::{AnalysisOracle, Sample, SampleKind};
use sentinel_store::AuditLog;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analysis::AnalysisClient;
use crate::audit::AuditWriter;
use crate::config::MonitorConfig;
use crate::domain::{ProctorAction, SessionInfo, SessionSnapshot, SessionSummary, StatusReport};
use crate::error::{MonitorError, Result};
use crate::escalation::EscalationReason;
use crate::hub::{MessageSink, SubscriberRole, SubscriptionToken};
use crate::messages::MonitorMessage;
use crate::metrics::METRICS;
use crate::monitor::{EndRequest, MonitorContext, SessionMonitor};
use crate::obs;
use crate::queue::EnqueueOutcome;

/// End reason used when a proctor terminates without giving one.
pub const PROCTOR_TERMINATED: &str = "proctor_terminated";

/// Answer to SubmitSample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub sample_id: Uuid,
    pub outcome: EnqueueOutcome,
}

impl SubmitReceipt {
    pub fn is_dropped(&self) -> bool {
        self.outcome.is_dropped()
    }

    /// The `frame_ack` sent back to the submitting connection.
    pub fn frame_ack(&self, session_id: &str) -> MonitorMessage {
        MonitorMessage::FrameAck {
            session_id: session_id.to_string(),
            sample_id: self.sample_id,
            status: self.outcome.as_str().to_string(),
            queue_size: self.outcome.depth(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retired sessions
// ---------------------------------------------------------------------------

/// Bounded FIFO of final snapshots for sessions that have ended.
struct RetiredSessions {
    capacity: usize,
    order: VecDeque<String>,
    snapshots: HashMap<String, SessionSnapshot>,
}

impl RetiredSessions {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            snapshots: HashMap::new(),
        }
    }

    fn insert(&mut self, snapshot: SessionSnapshot) {
        let id = snapshot.info.session_id.clone();
        if self.snapshots.insert(id.clone(), snapshot).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.snapshots.remove(&oldest);
            }
        }
    }

    fn get(&self, session_id: &str) -> Option<&SessionSnapshot> {
        self.snapshots.get(session_id)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

fn ended(snapshot: &SessionSnapshot) -> MonitorError {
    MonitorError::SessionEnded {
        session_id: snapshot.info.session_id.clone(),
        status: snapshot.status.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegistryInner {
    active: Mutex<HashMap<String, Arc<SessionMonitor>>>,
    retired: Mutex<RetiredSessions>,
}

impl RegistryInner {
    /// Move a session from the active table to the retired table.
    fn retire(&self, snapshot: SessionSnapshot) {
        let id = snapshot.info.session_id.clone();
        lock(&self.retired).insert(snapshot);
        lock(&self.active).remove(&id);
    }

    fn active(&self, session_id: &str) -> Option<Arc<SessionMonitor>> {
        lock(&self.active).get(session_id).cloned()
    }

    fn retired(&self, session_id: &str) -> Option<SessionSnapshot> {
        lock(&self.retired).get(session_id).cloned()
    }
}

/// Entry point for every session control operation.
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
    ctx: MonitorContext,
    audit_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionRegistry {
    /// Build a registry and start its audit writer. Must be called from
    /// within a tokio runtime.
    pub fn new(
        oracle: Arc<dyn AnalysisOracle>,
        audit: Arc<dyn AuditLog>,
        config: MonitorConfig,
    ) -> Self {
        let (writer, audit_task) = AuditWriter::spawn(audit, config.audit_buffer);
        let ctx = MonitorContext {
            analysis: AnalysisClient::new(oracle, config.oracle_timeout),
            audit: writer,
            shutdown: CancellationToken::new(),
            config: Arc::new(config),
        };
        Self {
            inner: Arc::new(RegistryInner {
                active: Mutex::new(HashMap::new()),
                retired: Mutex::new(RetiredSessions::new(ctx.config.retired_capacity)),
            }),
            ctx,
            audit_task: Arc::new(Mutex::new(Some(audit_task))),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.ctx.config
    }

    pub fn active_count(&self) -> usize {
        lock(&self.inner.active).len()
    }

    pub fn retired_count(&self) -> usize {
        lock(&self.inner.retired).len()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        lock(&self.inner.active).contains_key(session_id)
    }

    /// Start monitoring a session.
    ///
    /// Calling again for a live session returns its current snapshot without
    /// creating a second loop. A session that already ended cannot restart.
    pub async fn start_session(&self, info: SessionInfo) -> Result<SessionSnapshot> {
        let monitor = {
            let mut active = lock(&self.inner.active);
            match active.get(&info.session_id) {
                Some(existing) => Arc::clone(existing),
                None => {
                    if let Some(done) = lock(&self.inner.retired).get(&info.session_id) {
                        return Err(ended(done));
                    }
                    let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
                    let monitor = Arc::new(SessionMonitor::spawn(
                        info.clone(),
                        self.ctx.clone(),
                        Box::new(move |snapshot| {
                            if let Some(inner) = weak.upgrade() {
                                inner.retire(snapshot);
                            }
                        }),
                    ));
                    active.insert(info.session_id.clone(), Arc::clone(&monitor));
                    monitor
                }
            }
        };

        let snapshot = monitor.wait_started().await;
        if snapshot.status.is_terminal() {
            return Err(ended(&snapshot));
        }
        Ok(snapshot)
    }

    /// Queue a sample for analysis. Never waits for the loop.
    ///
    /// Only an active session takes samples; an unknown or ended one is
    /// `SessionNotFound`.
    pub fn submit_sample(
        &self,
        session_id: &str,
        kind: SampleKind,
        captured_at: DateTime<Utc>,
        payload: Vec<u8>,
    ) -> Result<SubmitReceipt> {
        let not_active = || MonitorError::SessionNotFound(session_id.to_string());
        let monitor = self.inner.active(session_id).ok_or_else(not_active)?;
        if monitor.snapshot().status.is_terminal() {
            return Err(not_active());
        }

        let sample = Sample::new(session_id, kind, captured_at, payload);
        let sample_id = sample.sample_id;
        match monitor.submit(sample) {
            Ok(outcome) => {
                METRICS.inc_enqueued(outcome.is_dropped());
                if let EnqueueOutcome::Dropped { evicted, depth } = outcome {
                    tracing::debug!(
                        session_id = %session_id,
                        evicted = %evicted,
                        depth,
                        "sample queue full, oldest sample evicted"
                    );
                }
                Ok(SubmitReceipt { sample_id, outcome })
            }
            Err(_) => Err(not_active()),
        }
    }

    /// End a session normally. Repeated calls return the stored summary.
    pub async fn end_session(&self, session_id: &str, reason: &str) -> Result<SessionSummary> {
        self.end_with(session_id, EndRequest::Finish, reason).await
    }

    pub fn get_status(&self, session_id: &str) -> Result<StatusReport> {
        if let Some(monitor) = self.inner.active(session_id) {
            return Ok(monitor.snapshot().report());
        }
        self.inner
            .retired(session_id)
            .map(|s| s.report())
            .ok_or_else(|| MonitorError::SessionNotFound(session_id.to_string()))
    }

    /// Apply a proctor's manual action.
    ///
    /// `warn` and `escalate` are broadcasts on a live session; `terminate`
    /// ends the session as terminated and succeeds again on an ended one.
    pub async fn proctor_action(
        &self,
        session_id: &str,
        action: ProctorAction,
        proctor_id: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let (monitor, message) = match action {
            ProctorAction::Terminate => {
                let reason = reason.unwrap_or(PROCTOR_TERMINATED);
                obs::emit_escalation(session_id, action.as_str(), reason);
                return self
                    .end_with(session_id, EndRequest::Terminate, reason)
                    .await
                    .map(|_| ());
            }
            ProctorAction::Warn => {
                let monitor = self.live(session_id)?;
                let reason = reason.unwrap_or_default().to_string();
                tracing::info!(
                    event = "proctor.warn",
                    session_id = %session_id,
                    proctor_id = %proctor_id,
                    reason = %reason,
                );
                let message = MonitorMessage::ProctorWarn {
                    session_id: session_id.to_string(),
                    proctor_id: proctor_id.to_string(),
                    reason,
                    timestamp: now,
                };
                (monitor, message)
            }
            ProctorAction::Escalate => {
                let monitor = self.live(session_id)?;
                if !monitor.mark_escalated().await {
                    return Err(ended(&monitor.snapshot()));
                }
                obs::emit_escalation(
                    session_id,
                    action.as_str(),
                    EscalationReason::ProctorAction.as_str(),
                );
                let message = MonitorMessage::ProctorEscalate {
                    session_id: session_id.to_string(),
                    proctor_id: proctor_id.to_string(),
                    reason: reason.unwrap_or_default().to_string(),
                    action_required: true,
                    timestamp: now,
                };
                (monitor, message)
            }
        };

        monitor.hub().broadcast(&message).await;
        Ok(())
    }

    /// Attach a connection to a live session's hub.
    ///
    /// The new subscriber immediately gets the current status: a
    /// `status_update`, preceded by a raw `session_status` for proctors.
    /// If the session ends while attaching, the sink gets `session_ended`
    /// instead. Keep the returned token for [`SessionRegistry::unsubscribe`].
    pub async fn subscribe(
        &self,
        session_id: &str,
        subscriber_id: &str,
        role: SubscriberRole,
        sink: Arc<dyn MessageSink>,
    ) -> Result<SubscriptionToken> {
        let monitor = self.live(session_id)?;
        let hub = monitor.hub();
        let registration = hub.subscribe(subscriber_id, role, sink).await;
        if registration.closed {
            tracing::debug!(session_id = %session_id, subscriber_id = %subscriber_id, "attached to an ended session");
            return Ok(registration.token);
        }
        if registration.replaced {
            tracing::debug!(session_id = %session_id, subscriber_id = %subscriber_id, "subscriber replaced");
        }

        let snapshot = monitor.snapshot();
        if role == SubscriberRole::Proctor {
            let _ = hub
                .send_to(subscriber_id, &MonitorMessage::status_snapshot(&snapshot))
                .await;
        }
        let _ = hub
            .send_to(subscriber_id, &MonitorMessage::status_update(&snapshot))
            .await;
        Ok(registration.token)
    }

    /// Detach the connection registered under `token`. Returns whether it
    /// was still registered; a newer registration under the same id stays.
    pub async fn unsubscribe(
        &self,
        session_id: &str,
        subscriber_id: &str,
        token: SubscriptionToken,
    ) -> bool {
        match self.inner.active(session_id) {
            Some(monitor) => monitor.hub().unsubscribe(subscriber_id, token).await,
            None => false,
        }
    }

    /// End every live session and stop the audit writer.
    pub async fn shutdown(&self) {
        self.ctx.shutdown.cancel();
        let monitors: Vec<Arc<SessionMonitor>> =
            lock(&self.inner.active).values().cloned().collect();
        for monitor in monitors {
            monitor.join().await;
        }
        self.ctx.audit.flush().await;
        tracing::info!(retired = self.retired_count(), "session registry shut down");
    }

    /// Wait until every audit record queued so far has been handled.
    pub async fn flush_audit(&self) {
        self.ctx.audit.flush().await;
    }

    pub fn audit_task(&self) -> Option<JoinHandle<()>> {
        lock(&self.audit_task).take()
    }

    async fn end_with(
        &self,
        session_id: &str,
        request: EndRequest,
        reason: &str,
    ) -> Result<SessionSummary> {
        if let Some(monitor) = self.inner.active(session_id) {
            if let Some(summary) = monitor.end(request, reason).await {
                return Ok(summary);
            }
        }
        // already ended, possibly while this request was in flight
        match self.inner.retired(session_id) {
            Some(snapshot) => Ok(snapshot.summary()),
            None if self.inner.active(session_id).is_some() => {
                Err(MonitorError::MonitorStopped(session_id.to_string()))
            }
            None => Err(MonitorError::SessionNotFound(session_id.to_string())),
        }
    }

    fn live(&self, session_id: &str) -> Result<Arc<SessionMonitor>> {
        self.inner
            .active(session_id)
            .ok_or_else(|| self.missing(session_id))
    }

    fn missing(&self, session_id: &str) -> MonitorError {
        match self.inner.retired(session_id) {
            Some(snapshot) => ended(&snapshot),
            None => MonitorError::SessionNotFound(session_id.to_string()),
        }
    }
}
