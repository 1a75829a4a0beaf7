//! Asynchronous audit side-channel.
//!
//! Monitor loops hand records to an [`AuditWriter`] with a non-blocking send;
//! a single writer task assigns per-session sequence numbers and appends to
//! the configured [`AuditLog`]. A full channel drops the record (counted in
//! [`METRICS`]); a store error is logged and the writer moves on.

use std::collections::HashMap;
use std::sync::Arc;

use sentinel_store::{AuditKind, AuditLog, AuditRecord};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::metrics::METRICS;
use crate::obs;

enum AuditCommand {
    Record {
        session_id: String,
        kind: AuditKind,
        payload: Value,
    },
    /// Resolves once every record queued before it has been handled
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct AuditWriter {
    tx: mpsc::Sender<AuditCommand>,
}

impl AuditWriter {
    /// Start the writer task. It runs until every `AuditWriter` clone is dropped.
    pub fn spawn(log: Arc<dyn AuditLog>, buffer: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(run_writer(log, rx));
        (Self { tx }, handle)
    }

    /// Queue one record without waiting. Returns `false` if it was dropped.
    pub fn record(&self, session_id: &str, kind: AuditKind, payload: Value) -> bool {
        let command = AuditCommand::Record {
            session_id: session_id.to_string(),
            kind,
            payload,
        };
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                METRICS.inc_audit_dropped();
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "audit buffer full",
                    mpsc::error::TrySendError::Closed(_) => "audit writer stopped",
                };
                obs::emit_audit_failed(session_id, &reason);
                false
            }
        }
    }

    /// Wait until everything queued so far has reached the store (or failed).
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_writer(log: Arc<dyn AuditLog>, mut rx: mpsc::Receiver<AuditCommand>) {
    let mut next_seq: HashMap<String, u64> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            AuditCommand::Record {
                session_id,
                kind,
                payload,
            } => {
                let seq = next_seq.entry(session_id.clone()).or_insert(0);
                *seq += 1;
                let record = AuditRecord::new(session_id.as_str(), *seq, kind, payload);
                if let Err(e) = log.append(record).await {
                    obs::emit_audit_failed(&session_id, &e);
                }
                if kind == AuditKind::SessionEnded {
                    next_seq.remove(&session_id);
                }
            }
            AuditCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("audit writer stopped");
}
