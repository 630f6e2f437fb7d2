use std::sync::Arc;

use axum::http::Method;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use beacon::api::ApiClient;
use beacon::audit::AuditLog;
use beacon::config::BeaconConfig;
use beacon::onboarding::{OnboardingCoordinator, OnboardingRouteState, onboarding_routes};
use beacon::reports::{GenerationContext, ReportRegistry, ReportRunner, ReportSubmitter};
use beacon::store::{Database, LibSqlBackend};
use beacon::worker::{PipelineDispatcher, QueueWorker, spawn_queue_worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BeaconConfig::from_env();
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    eprintln!("📡 Beacon v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   API: {}/beacon/{}",
        config.api.base_url, config.api.api_version
    );
    eprintln!("   Site: {}", config.site.url);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path_ref = std::path::Path::new(&config.db_path);
    let backend = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path, e
                );
                std::process::exit(1);
            }),
    );
    let db: Arc<dyn Database> = backend.clone();
    eprintln!("   Database: {}", config.db_path);

    // ── Remote API ───────────────────────────────────────────────────────
    let api = Arc::new(ApiClient::new(config.api.clone(), config.site.url.clone())?);
    if config.api.api_key.is_some() {
        match api.verify_api_key().await {
            Ok(_) => eprintln!("   API key: verified"),
            Err(e) => eprintln!("   Warning: API key check failed: {}", e),
        }
    } else {
        eprintln!("   API key: not set (submissions will fail until BEACON_API_KEY is set)");
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    let audit = AuditLog::new(Arc::clone(&db));
    let registry = Arc::new(ReportRegistry::new(GenerationContext::new(
        config.site.clone(),
    )));
    let coordinator = Arc::new(OnboardingCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&db),
        backend.clone(),
        audit.clone(),
        config.worker.group.clone(),
    ));
    let runner = Arc::new(ReportRunner::new(
        registry,
        Arc::clone(&db),
        ReportSubmitter::new(api, audit.clone()),
        audit,
    ));
    let dispatcher = PipelineDispatcher::new(Arc::clone(&coordinator), runner);
    let worker = Arc::new(QueueWorker::new(
        backend,
        dispatcher,
        config.worker.group.clone(),
        config.worker.batch,
    ));
    let _worker_handle = spawn_queue_worker(worker, config.worker.poll_interval);
    eprintln!(
        "   Worker: group '{}', every {}s, batch {}",
        config.worker.group,
        config.worker.poll_interval.as_secs(),
        config.worker.batch
    );

    // ── HTTP ─────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let app = onboarding_routes(OnboardingRouteState { coordinator })
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    eprintln!(
        "   Operator API: http://0.0.0.0:{}/api/onboarding/status\n",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Operator API started");
    axum::serve(listener, app).await?;

    Ok(())
}
