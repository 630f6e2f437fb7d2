//! Report submitter — normalises an envelope to the wire contract and
//! sends it through the remote API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::SubmissionApi;
use crate::audit::{AuditLog, LogScope};

/// A generated report ready to be sent.
#[derive(Debug, Clone)]
pub struct SubmissionEnvelope {
    /// Idempotency token. A fresh one is minted per attempt when absent.
    pub envelope_id: Option<Uuid>,
    pub report_type: String,
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub producer_version: String,
    pub payload: serde_json::Value,
}

/// Wire body of `reports/submit`.
#[derive(Debug, Serialize)]
struct WireEnvelope<'a> {
    envelope_id: String,
    report_type: &'a str,
    report_version: String,
    generated_at: String,
    payload: &'a serde_json::Value,
}

/// Outcome of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitResult {
    pub ok: bool,
    /// HTTP status, or 0 when no response was received.
    pub status_code: u16,
    pub error: Option<String>,
}

pub struct ReportSubmitter {
    api: Arc<dyn SubmissionApi>,
    audit: AuditLog,
}

impl ReportSubmitter {
    pub fn new(api: Arc<dyn SubmissionApi>, audit: AuditLog) -> Self {
        Self { api, audit }
    }

    /// Send one envelope. Never fails: every error is folded into the result.
    pub async fn submit(&self, envelope: SubmissionEnvelope) -> SubmitResult {
        let envelope_id = envelope.envelope_id.unwrap_or_else(Uuid::new_v4);

        if envelope.report_type.trim().is_empty() || envelope.payload.is_null() {
            self.audit
                .warning(
                    LogScope::Api,
                    "submit_envelope_incomplete",
                    "Submitting envelope with missing type or payload.",
                    serde_json::json!({
                        "envelope_id": envelope_id.to_string(),
                        "report_type": envelope.report_type,
                        "has_payload": !envelope.payload.is_null(),
                    }),
                )
                .await;
        }

        let wire = WireEnvelope {
            envelope_id: envelope_id.to_string(),
            report_type: &envelope.report_type,
            report_version: envelope.version.to_string(),
            generated_at: envelope.generated_at.to_rfc3339(),
            payload: &envelope.payload,
        };
        let body = match serde_json::to_value(&wire) {
            Ok(body) => body,
            Err(e) => {
                return SubmitResult {
                    ok: false,
                    status_code: 0,
                    error: Some(format!("Failed to encode envelope: {e}")),
                };
            }
        };

        tracing::debug!(
            envelope_id = %envelope_id,
            report_type = %envelope.report_type,
            version = envelope.version,
            producer_version = %envelope.producer_version,
            "Submitting report envelope"
        );

        match self.api.submit_report(&body).await {
            Ok(resp) => SubmitResult {
                ok: true,
                status_code: resp.code,
                error: None,
            },
            Err(e) => SubmitResult {
                ok: false,
                status_code: e.status_code(),
                error: Some(e.to_string()),
            },
        }
    }
}
