//! Report runner — one report's generate → store → submit cycle.
//!
//! Every outcome is captured on the report row; nothing propagates to the
//! caller. A run ends in exactly one terminal write: `failed` or
//! `submitted`. A pipeline run of an already submitted report writes
//! nothing, so duplicate jobs for the same key are harmless.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::audit::{AuditLog, LogLevel};
use crate::error::ReportError;
use crate::reports::hash::payload_hash;
use crate::reports::model::{ReportKey, ReportStatus};
use crate::reports::registry::ReportRegistry;
use crate::reports::submitter::{ReportSubmitter, SubmissionEnvelope};
use crate::store::{Database, setting_keys};

/// Message stored when the registry has no such definition.
pub const UNKNOWN_REPORT_MESSAGE: &str = "Unknown report type/version.";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Submitted,
    /// Pipeline run found the row already submitted; nothing was written.
    AlreadySubmitted,
    /// Row marked failed with this message.
    Failed(String),
    /// Row marked failed: no definition for the key.
    UnknownReport,
}

pub struct ReportRunner {
    registry: Arc<ReportRegistry>,
    store: Arc<dyn Database>,
    submitter: ReportSubmitter,
    audit: AuditLog,
}

impl ReportRunner {
    pub fn new(
        registry: Arc<ReportRegistry>,
        store: Arc<dyn Database>,
        submitter: ReportSubmitter,
        audit: AuditLog,
    ) -> Self {
        Self {
            registry,
            store,
            submitter,
            audit,
        }
    }

    /// Run one report. Without `rerun`, a row that is already submitted is
    /// left untouched and nothing is sent.
    pub async fn run(&self, key: &ReportKey, rerun: bool) -> RunOutcome {
        let started = Utc::now();
        if let Err(e) = self
            .store
            .set_setting(
                setting_keys::LAST_RUNNER_HEARTBEAT,
                &json!(started.to_rfc3339()),
            )
            .await
        {
            tracing::warn!("Failed to write runner heartbeat: {}", e);
        }

        self.audit
            .report(
                LogLevel::Info,
                "runner_start",
                key,
                "Report runner started.",
                json!({ "rerun": rerun }),
            )
            .await;

        if !rerun {
            match self.store.get_report(key).await {
                Ok(Some(row)) if row.status == ReportStatus::Submitted => {
                    self.audit
                        .report(
                            LogLevel::Info,
                            "runner_already_submitted",
                            key,
                            "Report already submitted; skipping.",
                            json!({}),
                        )
                        .await;
                    return RunOutcome::AlreadySubmitted;
                }
                Ok(_) => {}
                Err(e) => {
                    let msg = format!("Failed to read report row: {e}");
                    self.fail(key, "runner_storage_failed", &msg, json!({})).await;
                    return RunOutcome::Failed(msg);
                }
            }
        }

        let Some(definition) = self.registry.find(key) else {
            self.fail(key, "runner_unknown_report", UNKNOWN_REPORT_MESSAGE, json!({}))
                .await;
            return RunOutcome::UnknownReport;
        };

        let data = match definition.generate(self.registry.context()) {
            Ok(data) => data,
            Err(e) => {
                let msg = format!("Report generation failed: {e}");
                self.fail(key, "runner_generate_failed", &msg, json!({})).await;
                return RunOutcome::Failed(msg);
            }
        };

        let payload_json = match serde_json::to_string(&data) {
            Ok(s) => s,
            Err(e) => {
                let msg = ReportError::Encode(e).to_string();
                self.fail(key, "runner_encode_failed", &msg, json!({})).await;
                return RunOutcome::Failed(msg);
            }
        };

        let hash = payload_hash(&payload_json);
        let generated_at = Utc::now();

        if let Err(e) = self
            .store
            .upsert_generated(key, &payload_json, &hash, generated_at)
            .await
        {
            let msg = format!("Failed to store generated report: {e}");
            self.fail(key, "runner_storage_failed", &msg, json!({})).await;
            return RunOutcome::Failed(msg);
        }

        self.audit
            .report(
                LogLevel::Info,
                "runner_generated",
                key,
                "Report generated and stored.",
                json!({
                    "hash": hash,
                    "generated_at": generated_at.to_rfc3339(),
                    "bytes": payload_json.len(),
                }),
            )
            .await;

        let envelope = SubmissionEnvelope {
            envelope_id: None,
            report_type: key.report_type.clone(),
            version: key.version,
            generated_at,
            producer_version: self.registry.context().producer_version.clone(),
            payload: data,
        };

        self.audit
            .report(
                LogLevel::Info,
                "runner_submit_attempt",
                key,
                "Submitting report envelope.",
                json!({}),
            )
            .await;

        let result = self.submitter.submit(envelope).await;

        if !result.ok {
            let err = result
                .error
                .as_deref()
                .unwrap_or("Unknown submission error.");
            let msg = format!("Submit failed ({}): {}", result.status_code, err);
            self.fail(
                key,
                "runner_submit_failed",
                &msg,
                json!({ "status_code": result.status_code }),
            )
            .await;
            return RunOutcome::Failed(msg);
        }

        let submitted_at = Utc::now();
        if let Err(e) = self.store.mark_submitted(key, submitted_at).await {
            let msg = format!("Failed to record submission: {e}");
            self.fail(key, "runner_storage_failed", &msg, json!({})).await;
            return RunOutcome::Failed(msg);
        }

        self.audit
            .report(
                LogLevel::Info,
                "runner_submit_success",
                key,
                "Report submitted successfully.",
                json!({ "submitted_at": submitted_at.to_rfc3339() }),
            )
            .await;

        RunOutcome::Submitted
    }

    async fn fail(&self, key: &ReportKey, event: &str, message: &str, context: serde_json::Value) {
        if let Err(e) = self.store.mark_failed(key, message).await {
            tracing::error!(report_type = %key.report_type, version = key.version, "Failed to mark report failed: {}", e);
        }
        self.audit
            .report(LogLevel::Error, event, key, message, context)
            .await;
    }
}
