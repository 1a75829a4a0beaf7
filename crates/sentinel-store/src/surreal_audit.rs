//! SurrealDB-backed [`AuditLog`] implementation
//!
//! Rows are stored in the `audit_records` table (see `migrations`), converted
//! to and from [`AuditRecord`] at the boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::audit::{AuditKind, AuditLog, AuditRecord, StorageResult};
use crate::error::StoreError;
use crate::migrations;

const DEFAULT_NAMESPACE: &str = "sentinel";
const DEFAULT_DATABASE: &str = "audit";

/// Serializes chrono timestamps as SurrealDB datetimes
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&SurrealDatetime::from(*date), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row shape of `audit_records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditRow {
    session_id: String,
    seq: u64,
    kind: String,
    payload: serde_json::Value,
    #[serde(with = "surreal_datetime")]
    recorded_at: DateTime<Utc>,
}

impl From<AuditRecord> for AuditRow {
    fn from(record: AuditRecord) -> Self {
        AuditRow {
            session_id: record.session_id,
            seq: record.seq,
            kind: record.kind.as_str().to_string(),
            payload: record.payload,
            recorded_at: record.recorded_at,
        }
    }
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let kind = AuditKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown audit kind: {}", row.kind)))?;
        Ok(AuditRecord {
            session_id: row.session_id,
            seq: row.seq,
            kind,
            payload: row.payload,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionIdRow {
    session_id: String,
}

// ---------------------------------------------------------------------------
// SurrealConfig
// ---------------------------------------------------------------------------

/// Credentials for a remote SurrealDB instance
#[derive(Debug, Clone)]
pub struct SurrealConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Sign in as a root user instead of a database user
    pub is_root: bool,
}

impl SurrealConfig {
    /// Read remote credentials from the environment
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "sentinel")
    /// - SURREALDB_DATABASE (optional, default: "audit")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

// ---------------------------------------------------------------------------
// SurrealAuditLog
// ---------------------------------------------------------------------------

/// SurrealDB-backed implementation of [`AuditLog`].
pub struct SurrealAuditLog {
    db: Surreal<Any>,
}

impl SurrealAuditLog {
    /// In-memory instance (`mem://`), used by tests and the CLI simulator.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any engine URL (`mem://`, `surrealkv://path`, `ws://host`),
    /// select the default namespace and database, and run the schema.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StoreError::Connection(format!("failed to connect to {url}: {e}")))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!(url = %url, "SurrealAuditLog connected");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Resolution order: remote credentials ([`SurrealConfig::from_env`]),
    /// then `SURREALDB_URL`, then local persistence under `.sentinel/db`.
    pub async fn from_env() -> StorageResult<Self> {
        use surrealdb::opt::auth::{Database, Root};

        if let Ok(config) = SurrealConfig::from_env() {
            let db = surrealdb::engine::any::connect(&config.endpoint)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            if config.is_root {
                db.signin(Root {
                    username: &config.username,
                    password: &config.password,
                })
                .await
                .map_err(|e| StoreError::Connection(format!("root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &config.username,
                    password: &config.password,
                })
                .await
                .map_err(|e| StoreError::Connection(format!("db auth failed: {e}")))?;
            }

            db.use_ns(&config.namespace)
                .use_db(&config.database)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            migrations::init_schema(&db).await?;
            info!(endpoint = %config.endpoint, "SurrealAuditLog connected (remote)");
            return Ok(Self { db });
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return Self::connect(&url).await;
        }

        let path = ".sentinel/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StoreError::Connection(format!("failed to create database directory {path}: {e}"))
        })?;
        info!("no SurrealDB configuration found, using local persistence at {path}");
        Self::connect(&format!("surrealkv://{path}")).await
    }
}

#[async_trait]
impl AuditLog for SurrealAuditLog {
    async fn append(&self, record: AuditRecord) -> StorageResult<()> {
        let session_id = record.session_id.clone();
        let seq = record.seq;
        debug!(session_id = %session_id, seq, kind = %record.kind, "appending audit record");

        let _created: Option<AuditRow> = self
            .db
            .create("audit_records")
            .content(AuditRow::from(record))
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("idx_session_seq") {
                    StoreError::DuplicateSequence {
                        session_id: session_id.clone(),
                        seq,
                    }
                } else {
                    StoreError::Backend(msg)
                }
            })?;

        Ok(())
    }

    async fn records_for(&self, session_id: &str) -> StorageResult<Vec<AuditRecord>> {
        let sid = session_id.to_string();
        let mut res = self
            .db
            .query(
                "SELECT session_id, seq, kind, payload, recorded_at FROM audit_records \
                 WHERE session_id = $sid ORDER BY seq ASC",
            )
            .bind(("sid", sid))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows: Vec<AuditRow> = res
            .take(0)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let mut res = self
            .db
            .query(
                "SELECT session_id, recorded_at FROM audit_records \
                 WHERE kind = 'session_started' ORDER BY recorded_at DESC",
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows: Vec<SessionIdRow> = res
            .take(0)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.session_id).collect())
    }
}
