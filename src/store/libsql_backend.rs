//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. The `JobQueue`
//! implementation over the same connection lives in `store::jobs`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::audit::{LogEntry, LogLevel, StoredLog};
use crate::error::DatabaseError;
use crate::reports::{ReportKey, ReportRow, ReportStatus};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output with fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<&str>` to libsql Value.
pub(crate) fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<u32>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(i64::from(v)),
        None => libsql::Value::Null,
    }
}

const REPORT_COLUMNS: &str = "id, type, version, status, payload, payload_hash, generated_at, submitted_at, last_error, created_at, updated_at";

const LOG_COLUMNS: &str = "id, level, scope, event, message, context, request_id, report_type, report_version, created_at";

/// Map a libsql Row to a ReportRow.
///
/// Column order matches REPORT_COLUMNS. Unknown status strings read as
/// `pending` so a hand-edited row never breaks status derivation.
fn row_to_report(row: &libsql::Row) -> Result<ReportRow, libsql::Error> {
    let status_str: String = row.get(3)?;
    let generated_str: Option<String> = row.get(6).ok();
    let submitted_str: Option<String> = row.get(7).ok();
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;
    let version: i64 = row.get(2)?;

    Ok(ReportRow {
        id: row.get(0)?,
        report_type: row.get(1)?,
        version: u32::try_from(version).unwrap_or(0),
        status: status_str.parse().unwrap_or(ReportStatus::Pending),
        payload: row.get(4).ok(),
        payload_hash: row.get(5).ok(),
        generated_at: parse_optional_datetime(&generated_str),
        submitted_at: parse_optional_datetime(&submitted_str),
        last_error: row.get(8).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a StoredLog. Column order matches LOG_COLUMNS.
fn row_to_log(row: &libsql::Row) -> Result<StoredLog, libsql::Error> {
    let level_str: String = row.get(1)?;
    let context_str: Option<String> = row.get(5).ok();
    let report_version: Option<i64> = row.get(8).ok();
    let created_str: String = row.get(9)?;

    Ok(StoredLog {
        id: row.get(0)?,
        level: LogLevel::parse_lossy(&level_str),
        scope: row.get(2)?,
        event: row.get(3)?,
        message: row.get(4).ok(),
        context: context_str.and_then(|s| serde_json::from_str(&s).ok()),
        request_id: row.get(6).ok(),
        report_type: row.get(7).ok(),
        report_version: report_version.and_then(|v| u32::try_from(v).ok()),
        created_at: parse_datetime(&created_str),
    })
}

async fn collect_reports(
    mut rows: libsql::Rows,
    op: &str,
) -> Result<Vec<ReportRow>, DatabaseError> {
    let mut reports = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
    {
        reports.push(
            row_to_report(&row)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?,
        );
    }
    Ok(reports)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Reports ─────────────────────────────────────────────────────

    async fn upsert_pending(&self, key: &ReportKey) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO reports (type, version, status, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?3)
                 ON CONFLICT (type, version) DO UPDATE SET updated_at = ?3",
                params![key.report_type.as_str(), i64::from(key.version), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_pending: {e}")))?;
        debug!(report_type = %key.report_type, version = key.version, "Report seeded");
        Ok(())
    }

    async fn upsert_generated(
        &self,
        key: &ReportKey,
        payload: &str,
        payload_hash: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO reports (type, version, status, payload, payload_hash, generated_at,
                                      submitted_at, last_error, created_at, updated_at)
                 VALUES (?1, ?2, 'generated', ?3, ?4, ?5, NULL, NULL, ?6, ?6)
                 ON CONFLICT (type, version) DO UPDATE SET
                    status = 'generated',
                    payload = ?3,
                    payload_hash = ?4,
                    generated_at = ?5,
                    submitted_at = NULL,
                    last_error = NULL,
                    updated_at = ?6",
                params![
                    key.report_type.as_str(),
                    i64::from(key.version),
                    payload,
                    payload_hash,
                    generated_at.to_rfc3339(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_generated: {e}")))?;
        Ok(())
    }

    async fn mark_submitted(
        &self,
        key: &ReportKey,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE reports
                 SET status = 'submitted', submitted_at = ?3, last_error = NULL, updated_at = ?4
                 WHERE type = ?1 AND version = ?2",
                params![
                    key.report_type.as_str(),
                    i64::from(key.version),
                    submitted_at.to_rfc3339(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_submitted: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "report".into(),
                id: key.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_failed(&self, key: &ReportKey, error: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO reports (type, version, status, last_error, created_at, updated_at)
                 VALUES (?1, ?2, 'failed', ?3, ?4, ?4)
                 ON CONFLICT (type, version) DO UPDATE SET
                    status = 'failed',
                    last_error = ?3,
                    submitted_at = NULL,
                    updated_at = ?4",
                params![key.report_type.as_str(), i64::from(key.version), error, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_failed: {e}")))?;
        Ok(())
    }

    async fn get_report(&self, key: &ReportKey) -> Result<Option<ReportRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE type = ?1 AND version = ?2"),
                params![key.report_type.as_str(), i64::from(key.version)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_report: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let report = row_to_report(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_report row parse: {e}")))?;
                Ok(Some(report))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_report: {e}"))),
        }
    }

    async fn get_latest_report_by_type(
        &self,
        report_type: &str,
    ) -> Result<Option<ReportRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REPORT_COLUMNS} FROM reports WHERE type = ?1
                     ORDER BY version DESC LIMIT 1"
                ),
                params![report_type],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_latest_report_by_type: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let report = row_to_report(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_latest_report_by_type row parse: {e}"))
                })?;
                Ok(Some(report))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_latest_report_by_type: {e}"))),
        }
    }

    async fn list_reports_by_types(
        &self,
        report_types: &[String],
    ) -> Result<Vec<ReportRow>, DatabaseError> {
        if report_types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=report_types.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE type IN ({placeholders})
             ORDER BY type ASC, version DESC"
        );
        let values: Vec<libsql::Value> = report_types
            .iter()
            .map(|t| libsql::Value::Text(t.clone()))
            .collect();

        let rows = self
            .conn()
            .query(&sql, values)
            .await
            .map_err(|e| DatabaseError::Query(format!("list_reports_by_types: {e}")))?;

        collect_reports(rows, "list_reports_by_types").await
    }

    async fn delete_older_report_versions(
        &self,
        report_type: &str,
        keep_version: u32,
    ) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM reports WHERE type = ?1 AND version < ?2",
                params![report_type, i64::from(keep_version)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_older_report_versions: {e}")))?;

        if count > 0 {
            info!(report_type, keep_version, count, "Pruned superseded report versions");
        }
        Ok(count as usize)
    }

    async fn clear_reports(&self) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM reports", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_reports: {e}")))?;
        Ok(count as usize)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value: serde_json::Value =
                    serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value_str, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_setting: {e}")))?;
        Ok(count > 0)
    }

    // ── Audit log ───────────────────────────────────────────────────

    async fn insert_log(&self, entry: &LogEntry) -> Result<(), DatabaseError> {
        let context = entry
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO logs (level, scope, event, message, context, request_id,
                                   report_type, report_version, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.level.as_str(),
                    entry.scope.as_str(),
                    entry.event.as_str(),
                    opt_text(entry.message.as_deref()),
                    opt_text(context.as_deref()),
                    entry.request_id.as_str(),
                    opt_text(entry.report_type.as_deref()),
                    opt_int(entry.report_version),
                    entry.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_log: {e}")))?;
        Ok(())
    }

    async fn latest_logs(&self, limit: usize) -> Result<Vec<StoredLog>, DatabaseError> {
        let limit = limit.clamp(1, 1000) as i64;
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LOG_COLUMNS} FROM logs ORDER BY id DESC LIMIT ?1"),
                params![limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_logs: {e}")))?;

        let mut logs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_logs: {e}")))?
        {
            logs.push(
                row_to_log(&row)
                    .map_err(|e| DatabaseError::Query(format!("latest_logs row parse: {e}")))?,
            );
        }
        Ok(logs)
    }

    async fn clear_logs(&self) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM logs", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_logs: {e}")))?;
        Ok(count as usize)
    }
}
