//! HTTP routes over the session registry.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST | `/v1/sessions` | StartSession |
//! | POST | `/v1/sessions/:id/samples?kind=&captured_at=` | SubmitSample (raw body) |
//! | POST | `/v1/sessions/:id/end` | EndSession |
//! | GET | `/v1/sessions/:id/status` | GetStatus |
//! | POST | `/v1/sessions/:id/actions` | ProctorAction |
//! | GET | `/ws/subject/:id`, `/ws/proctor/:id` | live message streams |
//! | GET | `/healthz`, `/metrics` | liveness and counters |

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sentinel_core::metrics::METRICS;
use sentinel_core::{
    MonitorMessage, ProctorAction, SessionInfo, SessionRegistry, SessionStatus, SessionSummary,
    StatusReport,
};
use sentinel_oracle::SampleKind;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::ws;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/v1/sessions", post(start_session))
        .route("/v1/sessions/:id/samples", post(submit_sample))
        .route("/v1/sessions/:id/end", post(end_session))
        .route("/v1/sessions/:id/status", get(session_status))
        .route("/v1/sessions/:id/actions", post(proctor_action))
        .route("/ws/subject/:id", get(ws::subject_socket))
        .route("/ws/proctor/:id", get(ws::proctor_socket))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub session_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub attempt_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionAck {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleQuery {
    /// `frame` (default) or `audio`
    pub kind: Option<String>,
    /// Client capture time; defaults to arrival time
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndSessionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProctorActionRequest {
    pub action: String,
    pub proctor_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub session_id: String,
    pub action: ProctorAction,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub active_sessions: usize,
}

pub(crate) fn parse_kind(kind: Option<&str>) -> Result<SampleKind, ApiError> {
    match kind {
        None => Ok(SampleKind::Frame),
        Some(k) => k.parse().map_err(ApiError::BadRequest),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        active_sessions: state.registry.active_count(),
    })
}

async fn metrics() -> Json<BTreeMap<&'static str, u64>> {
    Json(METRICS.snapshot().into_iter().collect())
}

async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartSessionAck>), ApiError> {
    if req.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("session_id must not be empty".into()));
    }
    let info = SessionInfo::new(req.session_id, req.subject_id, req.exam_id, req.attempt_id);
    let snapshot = state.registry.start_session(info).await?;
    Ok((
        StatusCode::CREATED,
        Json(StartSessionAck {
            session_id: snapshot.info.session_id,
            status: snapshot.status,
            created_at: snapshot.created_at,
        }),
    ))
}

async fn submit_sample(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SampleQuery>,
    body: Bytes,
) -> Result<Json<MonitorMessage>, ApiError> {
    let kind = parse_kind(query.kind.as_deref())?;
    let captured_at = query.captured_at.unwrap_or_else(Utc::now);
    let receipt = state
        .registry
        .submit_sample(&session_id, kind, captured_at, body.to_vec())?;
    Ok(Json(receipt.frame_ack(&session_id)))
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<EndSessionRequest>>,
) -> Result<Json<SessionSummary>, ApiError> {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or_else(|| "submitted".to_string());
    let summary = state.registry.end_session(&session_id, &reason).await?;
    Ok(Json(summary))
}

async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.registry.get_status(&session_id)?))
}

async fn proctor_action(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ProctorActionRequest>,
) -> Result<Json<Ack>, ApiError> {
    let action: ProctorAction = req.action.parse()?;
    let proctor_id = req.proctor_id.as_deref().unwrap_or("proctor");
    state
        .registry
        .proctor_action(&session_id, action, proctor_id, req.reason.as_deref())
        .await?;
    Ok(Json(Ack {
        session_id,
        action,
        ok: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_defaults_to_frame() {
        assert_eq!(parse_kind(None).unwrap(), SampleKind::Frame);
        assert_eq!(parse_kind(Some("audio")).unwrap(), SampleKind::Audio);
        assert!(matches!(parse_kind(Some("video")), Err(ApiError::BadRequest(_))));
    }
}
