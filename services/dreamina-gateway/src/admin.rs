//! Admin API for the account pool
//!
//! Runs on its own listener (`server.admin_addr`) and is only started in
//! account mode. Keep it off public interfaces.
//!
//! Endpoints:
//! - GET  /admin/accounts         list accounts with their credit
//! - GET  /admin/pool             pool summary relative to the draw cost
//! - POST /admin/accounts/reload  re-run session initialization now

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tracing::info;

use dreamina_pool::{AccountCredentials, SessionStore};

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    store: Arc<SessionStore>,
    accounts: Arc<Vec<AccountCredentials>>,
    cost: i64,
}

impl AdminState {
    pub fn new(store: Arc<SessionStore>, accounts: Vec<AccountCredentials>, cost: i64) -> Self {
        Self {
            store,
            accounts: Arc::new(accounts),
            cost,
        }
    }
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/accounts", get(list_accounts))
        .route("/admin/accounts/reload", post(reload_accounts))
        .route("/admin/pool", get(pool_status))
        .with_state(state)
}

/// GET /admin/accounts: email and credit per account. Never exposes tokens.
async fn list_accounts(State(state): State<AdminState>) -> impl IntoResponse {
    let accounts = state.store.accounts().await;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "accounts": accounts }).to_string(),
    )
}

/// GET /admin/pool
async fn pool_status(State(state): State<AdminState>) -> impl IntoResponse {
    let summary = state.store.summary(state.cost).await;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!(summary).to_string(),
    )
}

/// POST /admin/accounts/reload: re-verify every configured account.
///
/// Blocks until the pass finishes, which may take a while with many
/// accounts since each one costs up to two upstream calls.
async fn reload_accounts(State(state): State<AdminState>) -> impl IntoResponse {
    info!(accounts = state.accounts.len(), "reload requested via admin API");
    let usable = state.store.initialize_sessions(&state.accounts).await;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "configured": state.accounts.len(),
            "usable": usable,
        })
        .to_string(),
    )
}
