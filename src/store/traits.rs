//! Unified `Database` trait — single async interface for report rows,
//! process-wide settings, and audit log rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::{LogEntry, StoredLog};
use crate::error::DatabaseError;
use crate::reports::{ReportKey, ReportRow};

/// Backend-agnostic database trait.
///
/// Every report write is scoped to a single `(type, version)` key and sets
/// all fields relevant to its transition in one statement.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Reports ─────────────────────────────────────────────────────

    /// Create the row as `pending` if absent; otherwise only touch `updated_at`.
    async fn upsert_pending(&self, key: &ReportKey) -> Result<(), DatabaseError>;

    /// Insert or update the row as `generated` with a fresh payload.
    ///
    /// Clears `last_error` and `submitted_at`.
    async fn upsert_generated(
        &self,
        key: &ReportKey,
        payload: &str,
        payload_hash: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Mark an existing row as `submitted` and clear `last_error`.
    async fn mark_submitted(
        &self,
        key: &ReportKey,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Mark the row as `failed` with `error`, creating it if absent.
    ///
    /// Leaves `payload`, `payload_hash` and `generated_at` untouched.
    async fn mark_failed(&self, key: &ReportKey, error: &str) -> Result<(), DatabaseError>;

    /// Point lookup.
    async fn get_report(&self, key: &ReportKey) -> Result<Option<ReportRow>, DatabaseError>;

    /// Highest-version row of a type.
    async fn get_latest_report_by_type(
        &self,
        report_type: &str,
    ) -> Result<Option<ReportRow>, DatabaseError>;

    /// Rows for the given types, ordered by type then version descending.
    async fn list_reports_by_types(
        &self,
        report_types: &[String],
    ) -> Result<Vec<ReportRow>, DatabaseError>;

    /// Delete rows of `report_type` with a version below `keep_version`.
    async fn delete_older_report_versions(
        &self,
        report_type: &str,
        keep_version: u32,
    ) -> Result<usize, DatabaseError>;

    /// Delete every report row. Returns the number deleted.
    async fn clear_reports(&self) -> Result<usize, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError>;

    async fn set_setting(&self, key: &str, value: &serde_json::Value)
    -> Result<(), DatabaseError>;

    async fn delete_setting(&self, key: &str) -> Result<bool, DatabaseError>;

    // ── Audit log ───────────────────────────────────────────────────

    async fn insert_log(&self, entry: &LogEntry) -> Result<(), DatabaseError>;

    /// Most recent log rows first. `limit` is clamped to 1..=1000.
    async fn latest_logs(&self, limit: usize) -> Result<Vec<StoredLog>, DatabaseError>;

    async fn clear_logs(&self) -> Result<usize, DatabaseError>;
}
