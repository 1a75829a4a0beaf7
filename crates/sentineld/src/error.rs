//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sentinel_core::MonitorError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Monitor(MonitorError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Monitor(MonitorError::SessionEnded { .. }) => StatusCode::CONFLICT,
            ApiError::Monitor(MonitorError::InvalidAction(_)) => StatusCode::BAD_REQUEST,
            ApiError::Monitor(MonitorError::MonitorStopped(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Monitor(MonitorError::SessionNotFound(_)) => "session_not_found",
            ApiError::Monitor(MonitorError::SessionEnded { .. }) => "session_ended",
            ApiError::Monitor(MonitorError::InvalidAction(_)) => "invalid_action",
            ApiError::Monitor(MonitorError::MonitorStopped(_)) => "monitor_stopped",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::from(MonitorError::SessionNotFound("s".into())), StatusCode::NOT_FOUND),
            (
                ApiError::from(MonitorError::SessionEnded {
                    session_id: "s".into(),
                    status: "completed".into(),
                }),
                StatusCode::CONFLICT,
            ),
            (ApiError::from(MonitorError::InvalidAction("pause".into())), StatusCode::BAD_REQUEST),
            (ApiError::BadRequest("kind".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn codes_are_snake_case() {
        let err = ApiError::from(MonitorError::SessionNotFound("s".into()));
        assert_eq!(err.code(), "session_not_found");
    }
}
