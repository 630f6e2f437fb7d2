//! Audit log — structured, best-effort event emission.
//!
//! Every event is mirrored to `tracing` and persisted to the `logs` table.
//! Persistence failures are swallowed: logging never fails the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reports::ReportKey;
use crate::store::Database;

const MAX_SCOPE_LEN: usize = 60;
const MAX_EVENT_LEN: usize = 80;
const MAX_CONTEXT_KEY_LEN: usize = 64;
const MAX_REPORT_TYPE_LEN: usize = 64;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Parse a stored level; anything unrecognised reads as `Info`.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// Subsystem an audit event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogScope {
    Admin,
    Reports,
    Api,
    System,
}

impl LogScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Reports => "reports",
            Self::Api => "api",
            Self::System => "system",
        }
    }
}

/// An audit row ready for insertion.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub scope: String,
    pub event: String,
    pub message: Option<String>,
    pub context: Option<serde_json::Value>,
    pub request_id: String,
    pub report_type: Option<String>,
    pub report_version: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// A persisted audit row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredLog {
    pub id: i64,
    pub level: LogLevel,
    pub scope: String,
    pub event: String,
    pub message: Option<String>,
    pub context: Option<serde_json::Value>,
    pub request_id: Option<String>,
    pub report_type: Option<String>,
    pub report_version: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Fire-and-forget audit sink.
#[derive(Clone)]
pub struct AuditLog {
    store: Option<Arc<dyn Database>>,
    request_id: String,
}

impl AuditLog {
    /// Audit log persisting to `store`. Each instance carries its own request id.
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self {
            store: Some(store),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Audit log that only mirrors to `tracing`.
    pub fn tracing_only() -> Self {
        Self {
            store: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub async fn debug(&self, scope: LogScope, event: &str, message: &str, context: serde_json::Value) {
        self.log(LogLevel::Debug, scope, event, message, context, None)
            .await;
    }

    pub async fn info(&self, scope: LogScope, event: &str, message: &str, context: serde_json::Value) {
        self.log(LogLevel::Info, scope, event, message, context, None)
            .await;
    }

    pub async fn warning(
        &self,
        scope: LogScope,
        event: &str,
        message: &str,
        context: serde_json::Value,
    ) {
        self.log(LogLevel::Warning, scope, event, message, context, None)
            .await;
    }

    pub async fn error(&self, scope: LogScope, event: &str, message: &str, context: serde_json::Value) {
        self.log(LogLevel::Error, scope, event, message, context, None)
            .await;
    }

    /// Log an event about one report; the key is added to the context and
    /// stored in dedicated columns.
    pub async fn report(
        &self,
        level: LogLevel,
        event: &str,
        key: &ReportKey,
        message: &str,
        context: serde_json::Value,
    ) {
        let mut context = context;
        match context.as_object_mut() {
            Some(obj) => {
                obj.insert("report_type".into(), key.report_type.clone().into());
                obj.insert("report_version".into(), key.version.into());
            }
            None => {
                context = serde_json::json!({
                    "report_type": key.report_type,
                    "report_version": key.version,
                });
            }
        }
        self.log(level, LogScope::Reports, event, message, context, Some(key))
            .await;
    }

    async fn log(
        &self,
        level: LogLevel,
        scope: LogScope,
        event: &str,
        message: &str,
        context: serde_json::Value,
        key: Option<&ReportKey>,
    ) {
        let scope = clip(scope.as_str(), MAX_SCOPE_LEN);
        let event = clip(event, MAX_EVENT_LEN);

        match level {
            LogLevel::Debug => tracing::debug!(scope = %scope, event = %event, context = %context, "{message}"),
            LogLevel::Info => tracing::info!(scope = %scope, event = %event, context = %context, "{message}"),
            LogLevel::Warning => tracing::warn!(scope = %scope, event = %event, context = %context, "{message}"),
            LogLevel::Error => tracing::error!(scope = %scope, event = %event, context = %context, "{message}"),
        }

        let Some(store) = &self.store else {
            return;
        };

        let entry = LogEntry {
            level,
            scope,
            event,
            message: (!message.is_empty()).then(|| message.to_string()),
            context: sanitise_context(context),
            request_id: self.request_id.clone(),
            report_type: key.map(|k| clip(&k.report_type, MAX_REPORT_TYPE_LEN)),
            report_version: key.map(|k| k.version),
            created_at: Utc::now(),
        };

        if let Err(e) = store.insert_log(&entry).await {
            tracing::debug!("Failed to write audit log: {}", e);
        }
    }
}

/// Drop empty contexts and clip object keys.
fn sanitise_context(context: serde_json::Value) -> Option<serde_json::Value> {
    match context {
        serde_json::Value::Null => None,
        serde_json::Value::Object(map) if map.is_empty() => None,
        serde_json::Value::Object(map) => Some(serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (clip(&k, MAX_CONTEXT_KEY_LEN), v))
                .collect(),
        )),
        other => Some(serde_json::json!({ "value": other })),
    }
}

/// Trim and cut to at most `max` characters.
fn clip(value: &str, max: usize) -> String {
    value.trim().chars().take(max).collect()
}
