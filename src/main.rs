use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use payments_backend::api::payments::{create_intent, get_intent_status, PaymentsState};
use payments_backend::api::webhooks::{handle_webhook, WebhookState};
use payments_backend::cache;
use payments_backend::config::AppConfig;
use payments_backend::database;
use payments_backend::database::attempt_repository::AttemptRepository;
use payments_backend::database::intent_repository::IntentRepository;
use payments_backend::health::{HealthChecker, HealthState, HealthStatus};
use payments_backend::logging::init_tracing;
use payments_backend::payments::factory::PaymentProviderFactory;
use payments_backend::payments::provider::PaymentProvider;
use payments_backend::services::PaymentsCoreService;
use payments_backend::webhook::allowlist::IpAllowlist;
use payments_backend::webhook::replay::ReplayGuard;
use payments_backend::webhook::WebhookGuard;
use payments_backend::workers::reconciliation::{ReconciliationConfig, ReconciliationWorker};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 starting payments backend"
    );

    let db_pool = database::init_pool_from_config(&config.database)
        .await
        .map_err(|e| {
            error!("failed to initialize database pool: {}", e);
            anyhow::anyhow!(e.to_string())
        })?;
    info!("✅ database connection pool initialized");

    // The replay cache is optional; without it the event ledger alone
    // provides the at-most-once guarantee.
    let cache_pool = match &config.cache.redis_url {
        Some(url) => {
            let cache_config = cache::CacheConfig {
                redis_url: url.clone(),
                max_connections: config.cache.max_connections,
                ..Default::default()
            };
            match cache::init_cache_pool(cache_config).await {
                Ok(pool) => {
                    info!("✅ replay cache pool initialized");
                    Some(pool)
                }
                Err(e) => {
                    warn!(error = %e, "replay cache unavailable, continuing without it");
                    None
                }
            }
        }
        None => {
            info!("replay cache disabled (REDIS_URL not set)");
            None
        }
    };

    let provider_factory = PaymentProviderFactory::from_env()
        .map_err(|e| anyhow::anyhow!("failed to initialize provider factory: {}", e))?;
    let provider: Arc<dyn PaymentProvider> = Arc::from(
        provider_factory
            .get_default_provider()
            .map_err(|e| anyhow::anyhow!("failed to initialize payment provider: {}", e))?,
    );
    let core = PaymentsCoreService::new(db_pool.clone());

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let sweeper_enabled = std::env::var("RECONCILIATION_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    let mut worker_handle = None;
    if sweeper_enabled {
        let worker_config = ReconciliationConfig::from_env();
        info!(
            poll_interval_secs = worker_config.poll_interval.as_secs(),
            pending_minutes = worker_config.pending_minutes,
            batch_size = worker_config.batch_size,
            "starting reconciliation worker"
        );
        let worker = ReconciliationWorker::new(
            db_pool.clone(),
            core.clone(),
            provider.clone(),
            worker_config,
        );
        worker_handle = Some(tokio::spawn(worker.run(worker_shutdown_rx)));
    } else {
        info!("reconciliation worker disabled (RECONCILIATION_ENABLED=false)");
    }

    let guard = WebhookGuard::new(
        config.webhook.secrets.clone(),
        config.webhook.signature_window_ms,
        ReplayGuard::new(cache_pool.clone(), config.webhook.replay_ttl_ms),
        IpAllowlist::new(&config.webhook.ip_allowlist),
    );

    let payments_state = PaymentsState {
        core: core.clone(),
        intents: Arc::new(IntentRepository::new(db_pool.clone())),
        provider: provider.clone(),
    };
    let webhook_state = WebhookState {
        guard: Arc::new(guard),
        core,
        attempts: Arc::new(AttemptRepository::new(db_pool.clone())),
        provider,
    };
    let health_checker = HealthChecker::new(db_pool, cache_pool);

    let payments_routes = Router::new()
        .route("/api/payments/intents", post(create_intent))
        .route(
            "/api/payments/intents/{id}/status",
            get(get_intent_status),
        )
        .with_state(payments_state);

    let webhook_routes = Router::new()
        .route("/webhooks/mercadopago", post(handle_webhook))
        .with_state(webhook_state);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .merge(payments_routes)
        .merge(webhook_routes)
        .with_state(AppState { health_checker })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
    .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            error!(error = %e, "timed out waiting for reconciliation worker shutdown");
        }
    }

    info!("👋 server shutdown complete");

    Ok(())
}

// Application state for the probe handlers
#[derive(Clone)]
struct AppState {
    health_checker: HealthChecker,
}

async fn root() -> &'static str {
    "payments backend"
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    let health_status = state.health_checker.check_health().await;

    if matches!(health_status.status, HealthState::Unhealthy) {
        error!("health check failed, service unhealthy");
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe: checks all dependencies.
async fn readiness(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    health(State(state)).await
}

/// Liveness probe: the process is up.
async fn liveness() -> &'static str {
    "OK"
}
