//! Errors surfaced by session control operations.
//!
//! The analysis loop itself never returns these: oracle faults, broadcast
//! failures and store outages are absorbed and logged inside the loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session existed but already reached an end state
    #[error("session {session_id} already ended ({status})")]
    SessionEnded { session_id: String, status: String },

    #[error("invalid proctor action: {0}")]
    InvalidAction(String),

    /// The monitor loop could not be reached or did not report back
    #[error("monitor for session {0} stopped unexpectedly")]
    MonitorStopped(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
