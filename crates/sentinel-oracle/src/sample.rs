//! Samples submitted by a test-taker's client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of capture a sample holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    Frame,
    Audio,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Frame => "frame",
            SampleKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SampleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frame" => Ok(SampleKind::Frame),
            "audio" => Ok(SampleKind::Audio),
            other => Err(format!("unknown sample kind: {other}")),
        }
    }
}

/// One captured frame or audio chunk.
///
/// The payload is opaque to everything except the oracle. It lives in the
/// session queue until dequeued and is dropped once analysis finishes.
#[derive(Clone)]
pub struct Sample {
    pub sample_id: Uuid,
    pub session_id: String,
    pub kind: SampleKind,
    /// Client-supplied capture time
    pub captured_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl Sample {
    pub fn new(
        session_id: impl Into<String>,
        kind: SampleKind,
        captured_at: DateTime<Utc>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            sample_id: Uuid::new_v4(),
            session_id: session_id.into(),
            kind,
            captured_at,
            payload,
        }
    }

    pub fn frame(session_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::new(session_id, SampleKind::Frame, Utc::now(), payload)
    }

    pub fn audio(session_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::new(session_id, SampleKind::Audio, Utc::now(), payload)
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("sample_id", &self.sample_id)
            .field("session_id", &self.session_id)
            .field("kind", &self.kind)
            .field("captured_at", &self.captured_at)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
