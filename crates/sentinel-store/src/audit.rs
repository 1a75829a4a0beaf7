//! Audit trail types and the [`AuditLog`] trait.
//!
//! The trail is write-mostly: the monitor appends, operators and tooling read.
//! Each record belongs to one session and carries a per-session sequence
//! number assigned by the writer, so readers can replay a session in order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StoreError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// PayloadDigest
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of a sample payload.
///
/// Sample bytes are never persisted; the digest is what ties an audit row
/// back to the frame or audio chunk the client submitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadDigest(String);

impl PayloadDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        PayloadDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for PayloadDigest {
    type Error = StoreError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidDigest { digest: s });
        }
        Ok(PayloadDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for PayloadDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AuditRecord
// ---------------------------------------------------------------------------

/// What an audit row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    SessionStarted,
    SampleAnalyzed,
    ViolationRecorded,
    AlertRaised,
    SessionEnded,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::SessionStarted => "session_started",
            AuditKind::SampleAnalyzed => "sample_analyzed",
            AuditKind::ViolationRecorded => "violation_recorded",
            AuditKind::AlertRaised => "alert_raised",
            AuditKind::SessionEnded => "session_ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "session_started" => Some(AuditKind::SessionStarted),
            "sample_analyzed" => Some(AuditKind::SampleAnalyzed),
            "violation_recorded" => Some(AuditKind::ViolationRecorded),
            "alert_raised" => Some(AuditKind::AlertRaised),
            "session_ended" => Some(AuditKind::SessionEnded),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: String,
    /// 1-based, strictly increasing within a session.
    pub seq: u64,
    pub kind: AuditKind,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        session_id: impl Into<String>,
        seq: u64,
        kind: AuditKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
            kind,
            payload,
            recorded_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// Append-only audit log.
///
/// Guarantees:
/// - `append` never modifies or removes earlier records.
/// - `(session_id, seq)` is unique; a repeat is rejected with
///   `StoreError::DuplicateSequence`.
/// - `records_for` returns a session's records ordered by `seq`.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record.
    async fn append(&self, record: AuditRecord) -> StorageResult<()>;

    /// All records of one session, ordered by `seq`. Unknown sessions yield an empty list.
    async fn records_for(&self, session_id: &str) -> StorageResult<Vec<AuditRecord>>;

    /// Ids of every session with a `session_started` record, newest first.
    async fn list_sessions(&self) -> StorageResult<Vec<String>>;
}
