//! Error types for sentinel-store

use thiserror::Error;

/// Errors raised by audit log implementations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach or authenticate against the backing database
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("schema setup failed: {0}")]
    SchemaSetup(String),

    /// Query or write rejected by the backend
    #[error("backend error: {0}")]
    Backend(String),

    /// Record payload could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A record with the same (session, seq) pair was already appended
    #[error("duplicate audit sequence {seq} for session {session_id}")]
    DuplicateSequence { session_id: String, seq: u64 },

    /// A digest string that is not 64 hex characters
    #[error("invalid payload digest: {digest}")]
    InvalidDigest { digest: String },
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
