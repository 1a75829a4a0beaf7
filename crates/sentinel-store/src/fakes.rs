//! In-memory fakes for [`AuditLog`] (testing only)
//!
//! `MemoryAuditLog` satisfies the trait contract without a database;
//! `FailingAuditLog` rejects every write so callers can prove they survive
//! a broken store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::audit::{AuditKind, AuditLog, AuditRecord, StorageResult};
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// MemoryAuditLog
// ---------------------------------------------------------------------------

/// In-memory audit log backed by a `HashMap<session_id, Vec<AuditRecord>>`.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    sessions: Mutex<HashMap<String, Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across every session.
    pub fn len(&self) -> usize {
        let sessions = self.sessions.lock().unwrap();
        sessions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> StorageResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let rows = sessions.entry(record.session_id.clone()).or_default();
        if rows.iter().any(|r| r.seq == record.seq) {
            return Err(StoreError::DuplicateSequence {
                session_id: record.session_id,
                seq: record.seq,
            });
        }
        rows.push(record);
        rows.sort_by_key(|r| r.seq);
        Ok(())
    }

    async fn records_for(&self, session_id: &str) -> StorageResult<Vec<AuditRecord>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let sessions = self.sessions.lock().unwrap();
        let mut started: Vec<(chrono::DateTime<chrono::Utc>, String)> = sessions
            .values()
            .flat_map(|rows| rows.iter())
            .filter(|r| r.kind == AuditKind::SessionStarted)
            .map(|r| (r.recorded_at, r.session_id.clone()))
            .collect();
        started.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(started.into_iter().map(|(_, id)| id).collect())
    }
}

// ---------------------------------------------------------------------------
// FailingAuditLog
// ---------------------------------------------------------------------------

/// Audit log whose every operation fails with a backend error.
#[derive(Debug, Default)]
pub struct FailingAuditLog;

#[async_trait]
impl AuditLog for FailingAuditLog {
    async fn append(&self, _record: AuditRecord) -> StorageResult<()> {
        Err(StoreError::Backend("audit store unavailable".into()))
    }

    async fn records_for(&self, _session_id: &str) -> StorageResult<Vec<AuditRecord>> {
        Err(StoreError::Backend("audit store unavailable".into()))
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        Err(StoreError::Backend("audit store unavailable".into()))
    }
}
