//! Dreamina image gateway
//!
//! Single-binary Rust service that:
//! 1. Logs in a pool of Dreamina accounts and tracks their credit
//! 2. Accepts draw requests over HTTP
//! 3. Bounds concurrent draws per end user
//! 4. Runs each draw on an account that can pay for it and debits the account

mod admin;
mod config;
mod draw;
mod error;
mod metrics;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dreamina_auth::{CacheFile, HttpIdentityService};
use dreamina_pool::{AdmissionGate, SessionStore, spawn_refresh_task};
use imagegen::{ImageGenerator, OpenApiGenerator};

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;
use crate::draw::{Credentials, DrawRequest, DrawSettings, DrawState};
use crate::metrics::ServiceMetrics;

/// Maximum time to wait for in-flight draws after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    draw: DrawState,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrent requests across all users; the
/// per-user cap is enforced separately by the admission gate.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/draw", post(draw_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting dreamina-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let jimeng = &config.jimeng;
    info!(
        listen_addr = %config.server.listen_addr,
        open_api_url = %jimeng.open_api_url,
        use_account = jimeng.use_account,
        accounts = jimeng.accounts.len(),
        model = %jimeng.model,
        model_cost = jimeng.model_cost,
        max_per_user = jimeng.max_concurrent_tasks_per_user,
        "configuration loaded"
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let generator: Arc<dyn ImageGenerator> = Arc::new(OpenApiGenerator::new(
        http_client.clone(),
        &jimeng.open_api_url,
        &jimeng.secret_key_prefix,
    ));

    let store = if jimeng.use_account {
        let identity = Arc::new(HttpIdentityService::new(http_client.clone()));
        let store = Arc::new(SessionStore::new(
            CacheFile::new(jimeng.cache_path.clone()),
            identity,
        ));

        let usable = store.initialize_sessions(&jimeng.accounts).await;
        if usable == 0 {
            warn!("no usable accounts, draws will be rejected until a refresh succeeds");
        }

        if jimeng.refresh_interval_secs > 0 {
            spawn_refresh_task(
                store.clone(),
                jimeng.accounts.clone(),
                Duration::from_secs(jimeng.refresh_interval_secs),
            );
            info!(
                interval_secs = jimeng.refresh_interval_secs,
                "periodic session refresh enabled"
            );
        }
        Some(store)
    } else {
        None
    };

    let credentials = match (&store, &jimeng.secret_key) {
        (Some(store), _) => Credentials::Pool(store.clone()),
        (None, Some(key)) => Credentials::StaticKey(key.clone()),
        (None, None) => anyhow::bail!("static key mode selected but no secret key loaded"),
    };

    let service_metrics = ServiceMetrics::new();
    let app_state = AppState {
        draw: DrawState {
            credentials,
            gate: Arc::new(AdmissionGate::new(jimeng.max_concurrent_tasks_per_user)),
            generator,
            settings: Arc::new(DrawSettings {
                model: jimeng.model.clone(),
                resolution: jimeng.resolution.clone(),
                ratio: jimeng.ratio.clone(),
                cost: jimeng.model_cost,
            }),
            metrics: service_metrics.clone(),
        },
        metrics: service_metrics.clone(),
        prometheus: prometheus_handle,
    };

    // Admin API on its own port, account mode only
    if let (Some(admin_addr), Some(store)) = (config.server.admin_addr, &store) {
        let admin_state = AdminState::new(store.clone(), jimeng.accounts.clone(), jimeng.model_cost);
        let admin_listener = TcpListener::bind(admin_addr)
            .await
            .with_context(|| format!("failed to bind admin API to {admin_addr}"))?;
        info!(addr = %admin_addr, "admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, build_admin_router(admin_state)).await {
                error!(error = %e, "admin API server failed");
            }
        });
    }

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting draw requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race the drain against
    // the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = service_metrics.in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    if let Some(store) = &store {
        match store.save().await {
            Ok(()) => info!("session cache saved"),
            Err(e) => warn!(error = %e, "failed to save session cache on shutdown"),
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: JSON with status, account count, admission load, uptime
/// and requests served.
///
/// Returns 200 when at least one account is loaded (or a static key is in
/// use), 503 when the pool is empty.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);

    let (mode, accounts, healthy) = match &state.draw.credentials {
        Credentials::Pool(store) => (
            "accounts",
            Some(store.available_account_count().await),
            store.is_available().await,
        ),
        Credentials::StaticKey(_) => ("static_key", None, true),
    };

    let status_code = if healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "mode": mode,
        "accounts": accounts,
        "admission": {
            "tracked_users": state.draw.gate.tracked_users().await,
            "max_per_user": state.draw.gate.max_per_user(),
        },
        "uptime_seconds": uptime,
        "requests_served": requests,
        "errors_total": errors,
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// POST /v1/draw
async fn draw_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<DrawRequest>, JsonRejection>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    match payload {
        Ok(Json(request)) => draw::handle_draw(&state.draw, request, request_id).await,
        Err(rejection) => draw::reject_malformed(&state.draw, rejection.body_text(), &request_id),
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
