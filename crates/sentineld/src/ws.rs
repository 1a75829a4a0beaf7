//! WebSocket connections for subjects and proctors.
//!
//! Each connection registers a channel-backed sink with the session's hub
//! and unregisters when the socket closes. Outbound hub traffic and direct
//! replies share one forwarder task; the socket is closed after
//! `session_ended` has been delivered.
//!
//! Inbound (JSON, tagged by `type`):
//!
//! - `ping` from either side, answered with `pong`
//! - `sample` from subjects: hex `payload`, optional `kind` and `timestamp`
//! - `command` from proctors: `command` (warn/escalate/terminate), optional `reason`
//!
//! Subjects may also send raw binary frames, treated as `frame` samples.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use sentinel_core::metrics::METRICS;
use sentinel_core::{
    ChannelSink, MessageSink, MonitorMessage, ProctorAction, SinkError, SubscriberRole,
};
use sentinel_oracle::SampleKind;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::ApiError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectQuery {
    /// Stable id for this connection; generated when absent
    pub subscriber_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ping,
    Sample {
        payload: String,
        kind: Option<SampleKind>,
        timestamp: Option<DateTime<Utc>>,
    },
    Command {
        command: String,
        reason: Option<String>,
        proctor_id: Option<String>,
    },
}

pub async fn subject_socket(
    state: State<AppState>,
    path: Path<String>,
    query: Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    upgrade(state, path, query, ws, SubscriberRole::Subject)
}

pub async fn proctor_socket(
    state: State<AppState>,
    path: Path<String>,
    query: Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    upgrade(state, path, query, ws, SubscriberRole::Proctor)
}

fn upgrade(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
    role: SubscriberRole,
) -> Result<Response, ApiError> {
    // reject before upgrading so the client sees a proper HTTP status
    state.registry.get_status(&session_id).and_then(|report| {
        if report.status.is_terminal() {
            Err(sentinel_core::MonitorError::SessionEnded {
                session_id: session_id.clone(),
                status: report.status.to_string(),
            })
        } else {
            Ok(())
        }
    })?;

    let subscriber_id = query
        .subscriber_id
        .unwrap_or_else(|| format!("{}-{}", role.as_str(), Uuid::new_v4()));
    Ok(ws.on_upgrade(move |socket| serve_socket(state, session_id, subscriber_id, role, socket)))
}

async fn serve_socket(
    state: AppState,
    session_id: String,
    subscriber_id: String,
    role: SubscriberRole,
    socket: WebSocket,
) {
    let (mut sender, mut receiver) = socket.split();
    let (sink, mut outbound) = ChannelSink::new(state.registry.config().subscriber_buffer);

    let token = match state
        .registry
        .subscribe(&session_id, &subscriber_id, role, Arc::new(sink.clone()))
        .await
    {
        Ok(token) => token,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "subscribe failed, closing socket");
            let _ = sender.close().await;
            return;
        }
    };
    debug!(session_id = %session_id, subscriber_id = %subscriber_id, role = role.as_str(), "connection attached");

    let mut forward = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let last = matches!(message, MonitorMessage::SessionEnded { .. });
            match message.to_json() {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode outbound message"),
            }
            if last {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut forward => break,
            frame = receiver.next() => {
                let reply = match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &session_id, &subscriber_id, role, &text).await
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        handle_binary(&state, &session_id, role, bytes)
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        debug!(session_id = %session_id, error = %e, "socket error");
                        break;
                    }
                };
                if let Some(reply) = reply {
                    if !send_reply(&sink, &session_id, &reply).await {
                        break;
                    }
                }
            }
        }
    }

    state
        .registry
        .unsubscribe(&session_id, &subscriber_id, token)
        .await;
    forward.abort();
    debug!(session_id = %session_id, subscriber_id = %subscriber_id, "connection detached");
}

/// Queue a direct reply for the forwarder. Returns `false` once the
/// connection is gone; a full buffer only drops this reply.
async fn send_reply(sink: &ChannelSink, session_id: &str, reply: &MonitorMessage) -> bool {
    match sink.send(reply).await {
        Ok(()) => true,
        Err(SinkError::Closed) => false,
        Err(e) => {
            METRICS.inc_broadcast_failures();
            debug!(session_id = %session_id, message = reply.kind(), error = %e, "reply dropped");
            true
        }
    }
}

async fn handle_text(
    state: &AppState,
    session_id: &str,
    subscriber_id: &str,
    role: SubscriberRole,
    text: &str,
) -> Option<MonitorMessage> {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(message) => handle_inbound(state, session_id, subscriber_id, role, message).await,
        Err(e) => Some(MonitorMessage::error(session_id, "bad_request", e.to_string())),
    }
}

fn handle_binary(
    state: &AppState,
    session_id: &str,
    role: SubscriberRole,
    bytes: Vec<u8>,
) -> Option<MonitorMessage> {
    if role != SubscriberRole::Subject {
        return Some(MonitorMessage::error(
            session_id,
            "bad_request",
            "only subject connections submit samples",
        ));
    }
    Some(submit(state, session_id, SampleKind::Frame, Utc::now(), bytes))
}

fn submit(
    state: &AppState,
    session_id: &str,
    kind: SampleKind,
    captured_at: DateTime<Utc>,
    payload: Vec<u8>,
) -> MonitorMessage {
    match state
        .registry
        .submit_sample(session_id, kind, captured_at, payload)
    {
        Ok(receipt) => receipt.frame_ack(session_id),
        Err(e) => {
            let err = ApiError::from(e);
            MonitorMessage::error(session_id, err.code(), err.to_string())
        }
    }
}

/// Apply one inbound message. Returns the direct reply, if any.
pub async fn handle_inbound(
    state: &AppState,
    session_id: &str,
    subscriber_id: &str,
    role: SubscriberRole,
    message: InboundMessage,
) -> Option<MonitorMessage> {
    match message {
        InboundMessage::Ping => Some(MonitorMessage::pong()),

        InboundMessage::Sample {
            payload,
            kind,
            timestamp,
        } => {
            if role != SubscriberRole::Subject {
                return Some(MonitorMessage::error(
                    session_id,
                    "bad_request",
                    "only subject connections submit samples",
                ));
            }
            let bytes = match hex::decode(payload.trim()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Some(MonitorMessage::error(
                        session_id,
                        "bad_request",
                        format!("payload is not hex: {e}"),
                    ))
                }
            };
            Some(submit(
                state,
                session_id,
                kind.unwrap_or(SampleKind::Frame),
                timestamp.unwrap_or_else(Utc::now),
                bytes,
            ))
        }

        InboundMessage::Command {
            command,
            reason,
            proctor_id,
        } => {
            if role != SubscriberRole::Proctor {
                return Some(MonitorMessage::error(
                    session_id,
                    "bad_request",
                    "commands are accepted from proctor connections only",
                ));
            }
            let result = match command.parse::<ProctorAction>() {
                Ok(action) => state
                    .registry
                    .proctor_action(
                        session_id,
                        action,
                        proctor_id.as_deref().unwrap_or(subscriber_id),
                        reason.as_deref(),
                    )
                    .await
                    .map_err(ApiError::from),
                Err(e) => Err(ApiError::from(e)),
            };
            match result {
                Ok(()) => None,
                Err(err) => Some(MonitorMessage::error(session_id, err.code(), err.to_string())),
            }
        }
    }
}
