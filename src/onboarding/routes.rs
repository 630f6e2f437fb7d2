//! REST endpoints for onboarding status and operator actions.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Error, QueueError};
use crate::reports::ReportKey;

use super::coordinator::OnboardingCoordinator;

const DEFAULT_LIST_LIMIT: usize = 200;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub coordinator: Arc<OnboardingCoordinator>,
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

impl LimitParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

/// Map a pipeline error onto a JSON error response.
fn error_response(e: Error) -> (StatusCode, Json<Value>) {
    let status = match &e {
        Error::Queue(QueueError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Pipeline(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "Onboarding request failed");
    }
    (status, Json(json!({ "ok": false, "error": e.to_string() })))
}

fn ok(body: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(body))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn service_status() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "service": "beacon",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Onboarding ──────────────────────────────────────────────────────────

/// GET /api/onboarding/status
///
/// Derived status plus the marker, diagnostics, and report rows.
async fn get_status(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.snapshot().await {
        Ok(snapshot) => ok(json!(snapshot)),
        Err(e) => error_response(e),
    }
}

/// POST /api/onboarding/start
async fn start(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.start().await {
        Ok(outcome) => {
            let queued = matches!(outcome, super::EnqueueOutcome::Enqueued(_));
            ok(json!({ "ok": true, "coordinator_enqueued": queued }))
        }
        Err(e) => error_response(e),
    }
}

// ── Reports ─────────────────────────────────────────────────────────────

async fn list_reports(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.reports().await {
        Ok(rows) => ok(json!(rows)),
        Err(e) => error_response(e),
    }
}

async fn latest_report(
    State(state): State<OnboardingRouteState>,
    Path(report_type): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.latest_report(&report_type).await {
        Ok(Some(row)) => ok(json!(row)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "Report not found" })),
        ),
        Err(e) => error_response(e),
    }
}

async fn rerun_report(
    State(state): State<OnboardingRouteState>,
    Path((report_type, version)): Path<(String, u32)>,
) -> impl IntoResponse {
    let key = ReportKey::new(report_type, version);
    match state.coordinator.rerun(&key).await {
        Ok(job_id) => ok(json!({ "ok": true, "job_id": job_id })),
        Err(e) => error_response(e),
    }
}

async fn retry_submit(
    State(state): State<OnboardingRouteState>,
    Path((report_type, version)): Path<(String, u32)>,
) -> impl IntoResponse {
    let key = ReportKey::new(report_type, version);
    match state.coordinator.retry_submit(&key).await {
        Ok(job_id) => ok(json!({ "ok": true, "job_id": job_id })),
        Err(e) => error_response(e),
    }
}

// ── Debug ───────────────────────────────────────────────────────────────

async fn unschedule(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.unschedule().await {
        Ok(count) => ok(json!({ "ok": true, "unscheduled": count })),
        Err(e) => error_response(e),
    }
}

async fn reset_status(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.reset_status().await {
        Ok(()) => ok(json!({ "ok": true })),
        Err(e) => error_response(e),
    }
}

async fn clear_reports(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.clear_reports().await {
        Ok(count) => ok(json!({ "ok": true, "cleared": count })),
        Err(e) => error_response(e),
    }
}

async fn clear_jobs(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.clear_jobs().await {
        Ok(count) => ok(json!({ "ok": true, "cleared": count })),
        Err(e) => error_response(e),
    }
}

async fn full_reset(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    match state.coordinator.full_reset().await {
        Ok(summary) => ok(json!({ "ok": true, "reset": summary })),
        Err(e) => error_response(e),
    }
}

async fn debug_logs(
    State(state): State<OnboardingRouteState>,
    Query(params): Query<LimitParams>,
) -> impl IntoResponse {
    match state.coordinator.recent_logs(params.limit()).await {
        Ok(logs) => ok(json!(logs)),
        Err(e) => error_response(e),
    }
}

async fn debug_jobs(
    State(state): State<OnboardingRouteState>,
    Query(params): Query<LimitParams>,
) -> impl IntoResponse {
    match state.coordinator.recent_jobs(params.limit()).await {
        Ok(jobs) => ok(json!(jobs)),
        Err(e) => error_response(e),
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/status", get(service_status))
        .route("/api/onboarding/status", get(get_status))
        .route("/api/onboarding/start", post(start))
        .route("/api/reports", get(list_reports))
        .route("/api/reports/{report_type}/latest", get(latest_report))
        .route("/api/reports/{report_type}/{version}/rerun", post(rerun_report))
        .route(
            "/api/reports/{report_type}/{version}/retry-submit",
            post(retry_submit),
        )
        .route("/api/debug/unschedule", post(unschedule))
        .route("/api/debug/reset-status", post(reset_status))
        .route("/api/debug/clear-reports", post(clear_reports))
        .route("/api/debug/clear-jobs", post(clear_jobs))
        .route("/api/debug/full-reset", post(full_reset))
        .route("/api/debug/logs", get(debug_logs))
        .route("/api/debug/jobs", get(debug_jobs))
        .with_state(state)
}
