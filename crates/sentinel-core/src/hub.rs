//! Per-session alert fan-out.
//!
//! An [`AlertHub`] holds the session's subscribers: the subject's own
//! connection and any number of proctor consoles. Broadcasting is best
//! effort per subscriber and never fails as a whole:
//!
//! - each send is bounded by [`SEND_TIMEOUT`] and runs concurrently with the others
//! - a failed send is logged and counted, and never reaches the caller
//! - a subscriber whose sink reports `Closed` is evicted
//!
//! Registration may happen at any time, including while a broadcast is in
//! flight. Each registration carries a [`SubscriptionToken`]; unsubscribe
//! and eviction only touch the registration they were issued for.
//! [`AlertHub::close`] is terminal: it delivers one final message and
//! any later subscriber gets that message instead of a registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::messages::MonitorMessage;
use crate::metrics::METRICS;
use crate::obs;

/// Upper bound on delivering one message to one subscriber.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The receiving side is gone; the subscriber will be evicted
    #[error("subscriber connection closed")]
    Closed,

    /// The subscriber's buffer is full; this message was dropped for it
    #[error("subscriber lagging, message dropped")]
    Lagging,

    #[error("send timed out")]
    TimedOut,

    #[error("send failed: {0}")]
    Other(String),
}

/// Destination for one subscriber's messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &MonitorMessage) -> Result<(), SinkError>;
}

/// Sink backed by a bounded mpsc channel. Never waits: a full channel
/// drops the message for this subscriber only.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<MonitorMessage>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<MonitorMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&self, message: &MonitorMessage) -> Result<(), SinkError> {
        self.tx.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Lagging,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Which connection class a subscriber belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberRole {
    Subject,
    Proctor,
}

impl SubscriberRole {
    pub fn accepts(&self, message: &MonitorMessage) -> bool {
        match self {
            SubscriberRole::Proctor => true,
            SubscriberRole::Subject => !message.is_proctor_only(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberRole::Subject => "subject",
            SubscriberRole::Proctor => "proctor",
        }
    }
}

/// Identifies one registration. A later registration under the same
/// subscriber id gets a new token, so a stale holder cannot remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Result of [`AlertHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub token: SubscriptionToken,
    /// An existing registration under the same id was replaced
    pub replaced: bool,
    /// The hub was already closed. The sink got the final message and
    /// was not registered.
    pub closed: bool,
}

#[derive(Clone)]
struct Subscriber {
    token: SubscriptionToken,
    role: SubscriberRole,
    sink: Arc<dyn MessageSink>,
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<String, Subscriber>,
    /// Set once by [`AlertHub::close`]
    farewell: Option<MonitorMessage>,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Subscribers whose role does not receive this message
    pub filtered: usize,
    pub failed: usize,
}

pub struct AlertHub {
    session_id: String,
    state: RwLock<HubState>,
    next_token: AtomicU64,
}

impl AlertHub {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: RwLock::new(HubState::default()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Register (or replace) a subscriber.
    ///
    /// On a closed hub nothing is registered; the sink is handed the
    /// final message directly so a late subscriber still sees the end.
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        role: SubscriberRole,
        sink: Arc<dyn MessageSink>,
    ) -> Registration {
        let subscriber_id = subscriber_id.into();
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let farewell = {
            let mut state = self.state.write().await;
            let Some(farewell) = state.farewell.clone() else {
                let replaced = state
                    .subscribers
                    .insert(subscriber_id, Subscriber { token, role, sink })
                    .is_some();
                return Registration {
                    token,
                    replaced,
                    closed: false,
                };
            };
            farewell
        };

        if role.accepts(&farewell) {
            if let Err(err) = deliver(sink.as_ref(), &farewell).await {
                obs::emit_broadcast_failed(&self.session_id, &subscriber_id, farewell.kind(), &err);
            }
        }
        Registration {
            token,
            replaced: false,
            closed: true,
        }
    }

    /// Remove the registration identified by `token`. A no-op when the id
    /// has since been re-registered.
    pub async fn unsubscribe(&self, subscriber_id: &str, token: SubscriptionToken) -> bool {
        let mut state = self.state.write().await;
        match state.subscribers.get(subscriber_id) {
            Some(sub) if sub.token == token => state.subscribers.remove(subscriber_id).is_some(),
            _ => false,
        }
    }

    /// Deliver `message` as the last one this hub carries and drop every
    /// subscriber. Later subscribers receive `message` instead of
    /// registering.
    pub async fn close(&self, message: &MonitorMessage) -> BroadcastReport {
        let targets: Vec<(String, Subscriber)> = {
            let mut state = self.state.write().await;
            state.farewell = Some(message.clone());
            std::mem::take(&mut state.subscribers).into_iter().collect()
        };
        let (report, _) = self.deliver_all(targets, message).await;
        report
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.farewell.is_some()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    pub async fn role_of(&self, subscriber_id: &str) -> Option<SubscriberRole> {
        self.state
            .read()
            .await
            .subscribers
            .get(subscriber_id)
            .map(|s| s.role)
    }

    /// Deliver to one subscriber, bypassing role filtering.
    pub async fn send_to(
        &self,
        subscriber_id: &str,
        message: &MonitorMessage,
    ) -> Result<(), SinkError> {
        let sink = {
            let state = self.state.read().await;
            state
                .subscribers
                .get(subscriber_id)
                .map(|s| Arc::clone(&s.sink))
        };
        match sink {
            Some(sink) => deliver(sink.as_ref(), message).await,
            None => Err(SinkError::Closed),
        }
    }

    pub async fn broadcast(&self, message: &MonitorMessage) -> BroadcastReport {
        let targets: Vec<(String, Subscriber)> = {
            let state = self.state.read().await;
            state
                .subscribers
                .iter()
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect()
        };

        let (report, closed) = self.deliver_all(targets, message).await;
        if !closed.is_empty() {
            let mut state = self.state.write().await;
            for (id, token) in closed {
                if state.subscribers.get(&id).is_some_and(|s| s.token == token) {
                    state.subscribers.remove(&id);
                }
            }
        }
        report
    }

    /// Concurrent delivery to `targets`. Also returns the registrations
    /// whose sinks reported `Closed`.
    async fn deliver_all(
        &self,
        targets: Vec<(String, Subscriber)>,
        message: &MonitorMessage,
    ) -> (BroadcastReport, Vec<(String, SubscriptionToken)>) {
        let mut report = BroadcastReport::default();
        let mut sends = Vec::with_capacity(targets.len());
        for (id, sub) in targets {
            if !sub.role.accepts(message) {
                report.filtered += 1;
                continue;
            }
            sends.push(async move {
                let result = deliver(sub.sink.as_ref(), message).await;
                (id, sub.token, result)
            });
        }

        let mut closed = Vec::new();
        for (id, token, result) in futures::future::join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    METRICS.inc_broadcast_failures();
                    obs::emit_broadcast_failed(&self.session_id, &id, message.kind(), &err);
                    if err == SinkError::Closed {
                        closed.push((id, token));
                    }
                }
            }
        }
        (report, closed)
    }
}

async fn deliver(sink: &dyn MessageSink, message: &MonitorMessage) -> Result<(), SinkError> {
    match tokio::time::timeout(SEND_TIMEOUT, sink.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::TimedOut),
    }
}
