//! Sentinel-Store: audit persistence for Proctor Sentinel
//!
//! Session, sample, violation and alert history is appended to an external
//! store as an audit trail. The monitor never reads it back on the hot path;
//! writes arrive through an asynchronous side-channel owned by `sentinel-core`.
//!
//! ## Layer 0 - Persistence
//!
//! ## Key Components
//!
//! - [`AuditLog`]: append-only trait every backend implements
//! - [`AuditRecord`] / [`AuditKind`]: one row of the trail
//! - [`SurrealAuditLog`]: SurrealDB-backed implementation
//! - [`fakes`]: in-memory implementations for tests

pub mod audit;
mod error;
pub mod fakes;
mod migrations;
pub mod surreal_audit;

pub use audit::{AuditKind, AuditLog, AuditRecord, PayloadDigest, StorageResult};
pub use error::StoreError;
pub use surreal_audit::{SurrealAuditLog, SurrealConfig};
