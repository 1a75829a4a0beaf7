//! HTTP analysis service client
//!
//! Posts the raw sample bytes to `{base_url}/v1/analyze/{kind}` and parses the
//! JSON verdict with [`parse_verdict`]. One [`HttpOracle`] serves one sample
//! kind; [`OracleConfig::router`] wires a frame and (optionally) an audio
//! client into an [`OracleRouter`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OracleError, OracleResult};
use crate::judgment::{parse_verdict, Judgment};
use crate::oracle::{AnalysisOracle, OracleRouter};
use crate::sample::{Sample, SampleKind};

/// Analysis service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of the analysis service
    pub base_url: String,
    /// Bearer token (optional for unauthenticated deployments)
    pub token: Option<String>,
    /// Per-request bound enforced by the HTTP client
    pub request_timeout: Duration,
    /// Whether the service also analyzes audio
    pub audio_enabled: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            base_url: std::env::var("SENTINEL_ORACLE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8700".to_string()),
            token: std::env::var("SENTINEL_ORACLE_TOKEN").ok(),
            request_timeout: std::env::var("SENTINEL_ORACLE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(10)),
            audio_enabled: std::env::var("SENTINEL_ORACLE_AUDIO")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        }
    }
}

impl OracleConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for a specific service URL, frames only
    pub fn new(base_url: &str) -> Self {
        OracleConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            request_timeout: Duration::from_secs(10),
            audio_enabled: false,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build a router with an HTTP frame client and, when enabled, an HTTP
    /// audio client sharing this config.
    pub fn router(&self) -> OracleResult<OracleRouter> {
        let router = OracleRouter::new(Arc::new(HttpOracle::new(
            self.clone(),
            SampleKind::Frame,
        )?));
        if self.audio_enabled {
            Ok(router.with_audio(Arc::new(HttpOracle::new(
                self.clone(),
                SampleKind::Audio,
            )?)))
        } else {
            Ok(router)
        }
    }
}

/// Oracle backed by a remote analysis service
pub struct HttpOracle {
    config: OracleConfig,
    kind: SampleKind,
    http_client: reqwest::Client,
}

impl HttpOracle {
    pub fn new(config: OracleConfig, kind: SampleKind) -> OracleResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("proctor-sentinel/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OracleError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpOracle {
            config,
            kind,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/analyze/{}", self.config.base_url, self.kind)
    }
}

#[async_trait]
impl AnalysisOracle for HttpOracle {
    async fn analyze(&self, sample: &Sample) -> OracleResult<Judgment> {
        if sample.kind != self.kind {
            return Err(OracleError::Unavailable(format!(
                "{} client cannot analyze {} samples",
                self.kind, sample.kind
            )));
        }

        let url = self.endpoint();
        debug!(url = %url, sample_id = %sample.sample_id, bytes = sample.payload.len(), "requesting analysis");

        let mut request = self
            .http_client
            .post(&url)
            .query(&[
                ("session_id", sample.session_id.clone()),
                ("sample_id", sample.sample_id.to_string()),
                ("captured_at", sample.captured_at.to_rfc3339()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(sample.payload.clone());

        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "analysis service rejected request");
            return Err(OracleError::Unavailable(format!(
                "analysis service returned {status}"
            )));
        }

        let body = response.text().await?;
        parse_verdict(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let config = OracleConfig::new("http://analysis.local/");
        let oracle = HttpOracle::new(config, SampleKind::Audio).unwrap();
        assert_eq!(oracle.endpoint(), "http://analysis.local/v1/analyze/audio");
    }

    #[test]
    fn router_includes_audio_only_when_enabled() {
        let frames_only = OracleConfig::new("http://a").router().unwrap();
        assert!(!frames_only.handles(SampleKind::Audio));

        let both = OracleConfig::new("http://a").with_audio(true).router().unwrap();
        assert!(both.handles(SampleKind::Audio));
    }
}
