//! Integration tests for the onboarding pipeline.
//!
//! A stub Beacon API runs on a random port so the real `ApiClient` is
//! exercised end to end. Pipeline state lives in an on-disk libSQL file and
//! the operator API is driven over HTTP.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;

use beacon::api::{ApiClient, SubmissionApi};
use beacon::audit::AuditLog;
use beacon::config::ApiConfig;
use beacon::error::ApiError;
use beacon::onboarding::{
    OnboardingCoordinator, OnboardingRouteState, OnboardingStatus, onboarding_routes,
};
use beacon::reports::{
    GenerationContext, ReportRegistry, ReportRunner, ReportStatus, ReportSubmitter, SiteInfo,
};
use beacon::store::{Database, LibSqlBackend};
use beacon::worker::{PipelineDispatcher, QueueWorker};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const API_KEY: &str = "k-123";
const GROUP: &str = "beacon";

/// How the stub remote answers.
#[derive(Debug, Clone, Copy)]
enum Reply {
    Accept,
    Unauthorized,
    ServerError,
    Garbage,
    Rejected,
}

/// A request seen by the stub remote.
#[derive(Debug, Clone)]
struct Seen {
    path: &'static str,
    authorization: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct Remote {
    reply: Arc<Mutex<Reply>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Remote {
    async fn set(&self, reply: Reply) {
        *self.reply.lock().await = reply;
    }

    async fn submissions(&self) -> Vec<Seen> {
        self.seen
            .lock()
            .await
            .iter()
            .filter(|s| s.path == "reports/submit")
            .cloned()
            .collect()
    }
}

async fn record(remote: &Remote, path: &'static str, headers: &HeaderMap, body: &str) -> (StatusCode, String) {
    remote.seen.lock().await.push(Seen {
        path,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(body).unwrap_or(Value::Null),
    });

    match *remote.reply.lock().await {
        Reply::Accept => (StatusCode::OK, json!({ "ok": true, "message": "Stored." }).to_string()),
        Reply::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            json!({ "message": "Bad key." }).to_string(),
        ),
        Reply::ServerError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": "Backend down." }).to_string(),
        ),
        Reply::Garbage => (StatusCode::OK, "<html>oops</html>".to_string()),
        Reply::Rejected => (
            StatusCode::OK,
            json!({ "ok": false, "message": "Schema mismatch." }).to_string(),
        ),
    }
}

async fn submit(
    State(remote): State<Remote>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    record(&remote, "reports/submit", &headers, &body).await
}

async fn verify(
    State(remote): State<Remote>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    record(&remote, "verify-api-key", &headers, &body).await
}

/// Start the stub remote API, return (base_url, remote).
async fn start_remote() -> (String, Remote) {
    let remote = Remote {
        reply: Arc::new(Mutex::new(Reply::Accept)),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/beacon/v1/reports/submit", post(submit))
        .route("/beacon/v1/verify-api-key", post(verify))
        .with_state(remote.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), remote)
}

fn api_client(base_url: &str, api_key: Option<&str>) -> ApiClient {
    ApiClient::new(
        ApiConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(|k| secrecy::SecretString::from(k.to_string())),
            timeout: Duration::from_secs(5),
            ..ApiConfig::default()
        },
        "https://acme.test/",
    )
    .unwrap()
}

struct Harness {
    db: Arc<LibSqlBackend>,
    coordinator: Arc<OnboardingCoordinator>,
    worker: QueueWorker,
    _dir: tempfile::TempDir,
}

async fn harness(base_url: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(
        LibSqlBackend::new_local(&dir.path().join("beacon.db"))
            .await
            .unwrap(),
    );
    let store: Arc<dyn Database> = db.clone();
    let audit = AuditLog::new(Arc::clone(&store));
    let registry = Arc::new(ReportRegistry::new(GenerationContext::new(SiteInfo {
        name: "Acme".into(),
        description: "Widgets and gadgets".into(),
        url: "https://acme.test/".into(),
    })));
    let coordinator = Arc::new(OnboardingCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        db.clone(),
        audit.clone(),
        GROUP,
    ));
    let runner = Arc::new(ReportRunner::new(
        registry,
        store,
        ReportSubmitter::new(Arc::new(api_client(base_url, Some(API_KEY))), audit.clone()),
        audit,
    ));
    let dispatcher = PipelineDispatcher::new(Arc::clone(&coordinator), runner);
    let worker = QueueWorker::new(db.clone(), dispatcher, GROUP, 10);

    Harness {
        db,
        coordinator,
        worker,
        _dir: dir,
    }
}

/// Serve the operator API for `coordinator`, return its base URL.
async fn start_operator_api(coordinator: Arc<OnboardingCoordinator>) -> String {
    let app = onboarding_routes(OnboardingRouteState { coordinator });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}

// ── Remote API client ───────────────────────────────────────────────

#[tokio::test]
async fn api_client_sends_bearer_and_meta() {
    timeout(TEST_TIMEOUT, async {
        let (base, remote) = start_remote().await;
        let api = api_client(&base, Some(API_KEY));

        let resp = api
            .submit_report(&json!({ "report_type": "website_profile", "site_url": "spoofed" }))
            .await
            .unwrap();
        assert_eq!(resp.code, 200);
        assert_eq!(resp.message.as_deref(), Some("Stored."));

        let seen = remote.submissions().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer k-123"));
        assert_eq!(seen[0].body["report_type"], "website_profile");
        assert_eq!(seen[0].body["site_url"], "https://acme.test/");
        assert_eq!(seen[0].body["producer_version"], env!("CARGO_PKG_VERSION"));
        assert!(seen[0].body["producer_os"].is_string());

        api.verify_api_key().await.unwrap();
        assert_eq!(remote.seen.lock().await.len(), 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn api_client_maps_remote_failures() {
    timeout(TEST_TIMEOUT, async {
        let (base, remote) = start_remote().await;
        let api = api_client(&base, Some(API_KEY));
        let body = json!({ "report_type": "website_profile" });

        remote.set(Reply::Unauthorized).await;
        let err = api.submit_report(&body).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.to_string(), "Bad key.");

        remote.set(Reply::ServerError).await;
        let err = api.submit_report(&body).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { code: 500, .. }));
        assert_eq!(err.to_string(), "Backend down.");

        remote.set(Reply::Garbage).await;
        let err = api.submit_report(&body).await.unwrap_err();
        assert!(matches!(err, ApiError::Protocol { code: 200 }));

        remote.set(Reply::Rejected).await;
        let err = api.submit_report(&body).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { code: 200, .. }));
        assert_eq!(err.to_string(), "Schema mismatch.");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_api_key_never_reaches_remote() {
    timeout(TEST_TIMEOUT, async {
        let (base, remote) = start_remote().await;
        let api = api_client(&base, None);

        let err = api.submit_report(&json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingApiKey));
        assert!(remote.seen.lock().await.is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_submits_every_required_report() {
    timeout(TEST_TIMEOUT, async {
        let (base, remote) = start_remote().await;
        let h = harness(&base).await;

        h.coordinator.start().await.unwrap();
        assert_eq!(
            h.coordinator.effective_status().await.unwrap(),
            OnboardingStatus::Running
        );

        h.worker.run_until_idle(20).await;
        assert_eq!(
            h.coordinator.effective_status().await.unwrap(),
            OnboardingStatus::Completed
        );

        let seen = remote.submissions().await;
        assert_eq!(seen.len(), 2);
        let types: Vec<&str> = seen
            .iter()
            .map(|s| s.body["report_type"].as_str().unwrap())
            .collect();
        assert_eq!(types, ["website_profile", "website_content_areas"]);
        assert_ne!(seen[0].body["envelope_id"], seen[1].body["envelope_id"]);
        for s in &seen {
            assert_eq!(s.body["report_version"], "1");
            assert!(s.body["payload"].is_object());
        }

        for row in h.coordinator.reports().await.unwrap() {
            assert_eq!(row.status, ReportStatus::Submitted);
            assert!(row.payload_hash.is_some());
            assert!(row.submitted_at.is_some());
            assert!(row.last_error.is_none());
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rejected_submissions_recover_after_rerun() {
    timeout(TEST_TIMEOUT, async {
        let (base, remote) = start_remote().await;
        let h = harness(&base).await;
        let operator = start_operator_api(Arc::clone(&h.coordinator)).await;
        let client = reqwest::Client::new();

        remote.set(Reply::Unauthorized).await;
        h.coordinator.start().await.unwrap();
        h.worker.run_until_idle(20).await;

        let status: Value = client
            .get(format!("{operator}/api/onboarding/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "needs_attention");
        assert_eq!(status["queue_active"], false);
        let reports = status["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 2);
        for r in reports {
            assert_eq!(r["status"], "failed");
            assert_eq!(r["last_error"], "Submit failed (401): Bad key.");
        }

        remote.set(Reply::Accept).await;
        for path in [
            "website_profile/1/rerun",
            "website_content_areas/1/retry-submit",
        ] {
            let resp = client
                .post(format!("{operator}/api/reports/{path}"))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["ok"], true);
            assert!(body["job_id"].is_i64());
        }

        h.worker.run_until_idle(20).await;
        assert_eq!(
            h.coordinator.effective_status().await.unwrap(),
            OnboardingStatus::Completed
        );
        assert_eq!(remote.submissions().await.len(), 4);
    })
    .await
    .expect("test timed out");
}

// ── Operator API ────────────────────────────────────────────────────

#[tokio::test]
async fn operator_start_is_deduplicated() {
    timeout(TEST_TIMEOUT, async {
        let (base, _remote) = start_remote().await;
        let h = harness(&base).await;
        let operator = start_operator_api(Arc::clone(&h.coordinator)).await;
        let client = reqwest::Client::new();

        let status: Value = reqwest::get(format!("{operator}/api/onboarding/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "not_started");
        assert!(status["marker"].is_null());

        let first: Value = client
            .post(format!("{operator}/api/onboarding/start"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(first["coordinator_enqueued"], true);

        let second: Value = client
            .post(format!("{operator}/api/onboarding/start"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(second["coordinator_enqueued"], false);

        let status: Value = reqwest::get(format!("{operator}/api/onboarding/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "running");
        assert_eq!(status["marker"], "running");

        let jobs: Value = reqwest::get(format!("{operator}/api/debug/jobs?limit=10"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(jobs.as_array().unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn operator_rejects_bad_requests() {
    timeout(TEST_TIMEOUT, async {
        let (base, _remote) = start_remote().await;
        let h = harness(&base).await;
        let operator = start_operator_api(Arc::clone(&h.coordinator)).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{operator}/api/reports/website_profile/0/rerun"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["ok"], false);
        assert!(body["error"].is_string());

        let resp = reqwest::get(format!("{operator}/api/reports/website_profile/latest"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = reqwest::get(format!("{operator}/api/status")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["service"], "beacon");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn operator_full_reset_returns_to_not_started() {
    timeout(TEST_TIMEOUT, async {
        let (base, _remote) = start_remote().await;
        let h = harness(&base).await;
        let operator = start_operator_api(Arc::clone(&h.coordinator)).await;
        let client = reqwest::Client::new();

        h.coordinator.start().await.unwrap();
        h.worker.run_until_idle(20).await;

        let latest: Value = reqwest::get(format!("{operator}/api/reports/website_profile/latest"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(latest["status"], "submitted");

        let cleared: Value = client
            .post(format!("{operator}/api/debug/clear-jobs"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cleared["cleared"], 5);

        let reset: Value = client
            .post(format!("{operator}/api/debug/full-reset"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reset["ok"], true);
        assert_eq!(reset["reset"]["reports_cleared"], 2);

        assert_eq!(
            h.coordinator.effective_status().await.unwrap(),
            OnboardingStatus::NotStarted
        );
        assert!(h.coordinator.reports().await.unwrap().is_empty());
        assert!(h.db.get_setting("onboarding_status").await.unwrap().is_none());

        let logs: Value = reqwest::get(format!("{operator}/api/debug/logs?limit=3"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let logs = logs.as_array().unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0]["event"], "reports_cleared");
    })
    .await
    .expect("test timed out");
}
