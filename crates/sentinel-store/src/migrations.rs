//! SurrealDB schema for the audit trail
//!
//! Safe to run on every connection (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StoreError;

/// Initialize every table the audit log writes to.
pub async fn init_schema(db: &Surreal<Any>) -> Result<(), StoreError> {
    info!("Initializing sentinel audit schema");
    init_audit_records_table(db).await?;
    info!("Sentinel audit schema initialization complete");
    Ok(())
}

/// Initialize `audit_records`
///
/// Schema:
/// ```text
/// TABLE audit_records {
///   session_id:   STRING
///   seq:          INT (1-based, monotonic within session)
///   kind:         STRING (session_started | sample_analyzed | violation_recorded
///                         | alert_raised | session_ended)
///   payload:      OBJECT
///   recorded_at:  DATETIME
/// }
/// ```
///
/// Rows are immutable: updates and deletes are denied at the table level.
async fn init_audit_records_table(db: &Surreal<Any>) -> Result<(), StoreError> {
    debug!("Initializing audit_records table");

    let sql = r#"
        DEFINE TABLE audit_records AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_session_seq ON TABLE audit_records COLUMNS session_id, seq UNIQUE;
        DEFINE INDEX idx_session_id ON TABLE audit_records COLUMNS session_id;
        DEFINE INDEX idx_kind ON TABLE audit_records COLUMNS kind;
        DEFINE INDEX idx_recorded_at ON TABLE audit_records COLUMNS recorded_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StoreError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StoreError::SchemaSetup(e.to_string()))?;
    info!("audit_records table initialized");
    Ok(())
}
