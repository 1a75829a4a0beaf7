//! HTTP API tests against a live router on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sentinel_core::{MonitorConfig, SessionRegistry, SubscriberRole};
use sentinel_oracle::fakes::{FixedOracle, StallingOracle};
use sentinel_oracle::{AnalysisOracle, Judgment};
use sentinel_store::fakes::MemoryAuditLog;
use sentineld::ws::{handle_inbound, InboundMessage};
use sentineld::{build_router, AppState};
use serde_json::{json, Value};

async fn spawn_service(oracle: impl AnalysisOracle + 'static) -> (String, AppState) {
    spawn_with(oracle, MonitorConfig::default()).await
}

async fn spawn_with(oracle: impl AnalysisOracle + 'static, config: MonitorConfig) -> (String, AppState) {
    let registry = SessionRegistry::new(Arc::new(oracle), Arc::new(MemoryAuditLog::new()), config);
    let state = AppState::new(registry);
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

async fn start(client: &reqwest::Client, base: &str, session_id: &str) -> reqwest::Response {
    client
        .post(format!("{base}/v1/sessions"))
        .json(&json!({
            "session_id": session_id,
            "subject_id": "student-1",
            "exam_id": "exam-1",
            "attempt_id": "1",
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let (base, _state) = spawn_service(FixedOracle::clean()).await;
    let client = reqwest::Client::new();

    let resp = start(&client, &base, "http-1").await;
    assert_eq!(resp.status(), 201);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["status"], "active");

    let resp = client
        .post(format!("{base}/v1/sessions/http-1/samples?kind=frame"))
        .body(vec![0xffu8, 0xd8])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let frame_ack: Value = resp.json().await.unwrap();
    assert_eq!(frame_ack["type"], "frame_ack");
    assert_eq!(frame_ack["status"], "accepted");

    let resp = client
        .get(format!("{base}/v1/sessions/http-1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["session_id"], "http-1");

    let resp = client
        .post(format!("{base}/v1/sessions/http-1/end"))
        .json(&json!({ "reason": "submitted" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["final_status"], "completed");
    assert_eq!(summary["end_reason"], "submitted");

    // an ended session no longer takes samples
    let resp = client
        .post(format!("{base}/v1/sessions/http-1/samples"))
        .body(vec![1u8])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"], "session_not_found");

    // and cannot be started again
    let resp = start(&client, &base, "http-1").await;
    assert_eq!(resp.status(), 409);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"], "session_ended");
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (base, _state) = spawn_service(FixedOracle::clean()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/v1/sessions/ghost/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"], "session_not_found");

    let resp = client
        .get(format!("{base}/ws/proctor/ghost"))
        .send()
        .await
        .unwrap();
    assert_ne!(resp.status(), 101);
}

#[tokio::test]
async fn proctor_actions_over_http() {
    let (base, _state) = spawn_service(FixedOracle::clean()).await;
    let client = reqwest::Client::new();
    start(&client, &base, "http-2").await;

    let resp = client
        .post(format!("{base}/v1/sessions/http-2/actions"))
        .json(&json!({ "action": "pause" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"], "invalid_action");

    let resp = client
        .post(format!("{base}/v1/sessions/http-2/actions"))
        .json(&json!({ "action": "terminate", "proctor_id": "p-1", "reason": "impersonation" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // terminate again is still a success
    let resp = client
        .post(format!("{base}/v1/sessions/http-2/actions"))
        .json(&json!({ "action": "terminate" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let status: Value = client
        .get(format!("{base}/v1/sessions/http-2/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "terminated");
}

#[tokio::test]
async fn bad_sample_kind_is_400() {
    let (base, _state) = spawn_service(FixedOracle::clean()).await;
    let client = reqwest::Client::new();
    start(&client, &base, "http-3").await;

    let resp = client
        .post(format!("{base}/v1/sessions/http-3/samples?kind=video"))
        .body(vec![1u8])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn full_queue_reports_dropped() {
    let config = MonitorConfig::default()
        .with_queue_capacity(1)
        .with_oracle_timeout(Duration::from_secs(60));
    let (base, _state) = spawn_with(StallingOracle, config).await;
    let client = reqwest::Client::new();
    start(&client, &base, "http-4").await;

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let ack: Value = client
            .post(format!("{base}/v1/sessions/http-4/samples"))
            .body(vec![1u8])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        statuses.push(ack["status"].as_str().unwrap().to_string());
    }
    // the loop holds at most one sample in analysis; the rest overflow
    assert!(statuses.iter().any(|s| s == "dropped"));
}

#[tokio::test]
async fn health_and_metrics() {
    let (base, _state) = spawn_service(FixedOracle::clean()).await;
    let client = reqwest::Client::new();
    start(&client, &base, "http-5").await;

    let health: Value = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["active_sessions"], 1);

    let metrics: Value = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(metrics["sessions_started"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn inbound_socket_messages() {
    let (_base, state) = spawn_service(FixedOracle::new(Judgment::frame(1))).await;
    let client = reqwest::Client::new();
    start(&client, &_base, "ws-1").await;

    let pong = handle_inbound(&state, "ws-1", "subject", SubscriberRole::Subject, InboundMessage::Ping)
        .await
        .unwrap();
    assert_eq!(pong.kind(), "pong");

    let ack = handle_inbound(
        &state,
        "ws-1",
        "subject",
        SubscriberRole::Subject,
        InboundMessage::Sample {
            payload: "ffd8ff".into(),
            kind: None,
            timestamp: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(ack.kind(), "frame_ack");

    let bad_hex = handle_inbound(
        &state,
        "ws-1",
        "subject",
        SubscriberRole::Subject,
        InboundMessage::Sample {
            payload: "zz".into(),
            kind: None,
            timestamp: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(bad_hex.kind(), "error");

    // subjects cannot issue proctor commands
    let refused = handle_inbound(
        &state,
        "ws-1",
        "subject",
        SubscriberRole::Subject,
        InboundMessage::Command {
            command: "terminate".into(),
            reason: None,
            proctor_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(refused.kind(), "error");
    assert!(state.registry.is_active("ws-1"));

    let invalid = handle_inbound(
        &state,
        "ws-1",
        "proctor-1",
        SubscriberRole::Proctor,
        InboundMessage::Command {
            command: "pause".into(),
            reason: None,
            proctor_id: None,
        },
    )
    .await
    .unwrap();
    let json = serde_json::to_value(&invalid).unwrap();
    assert_eq!(json["code"], "invalid_action");

    let applied = handle_inbound(
        &state,
        "ws-1",
        "proctor-1",
        SubscriberRole::Proctor,
        InboundMessage::Command {
            command: "terminate".into(),
            reason: Some("second device".into()),
            proctor_id: None,
        },
    )
    .await;
    assert!(applied.is_none());
    assert!(!state.registry.is_active("ws-1"));
}
