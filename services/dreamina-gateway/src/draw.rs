//! Draw request handling
//!
//! A draw runs in four steps: take one of the caller's admission slots, pick
//! an account that can pay for the job, run the generation, then debit the
//! account. Only a successful generation is debited. The admission slot is
//! held for the whole job and released when the handler returns, on every
//! path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::Secret;
use dreamina_pool::{AdmissionGate, SessionStore};
use imagegen::{GenerationRequest, ImageGenerator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::Error;
use crate::metrics::ServiceMetrics;

/// Where the upstream credential for a draw comes from.
#[derive(Clone)]
pub enum Credentials {
    /// Pooled accounts; the chosen account is debited on success
    Pool(Arc<SessionStore>),
    /// One fixed key with no credit accounting
    StaticKey(Secret<String>),
}

/// Generation parameters shared by every draw.
#[derive(Debug, Clone)]
pub struct DrawSettings {
    pub model: String,
    pub resolution: String,
    pub ratio: Option<String>,
    /// Credit a single draw costs
    pub cost: i64,
}

/// Shared state passed to the draw handler
#[derive(Clone)]
pub struct DrawState {
    pub credentials: Credentials,
    pub gate: Arc<AdmissionGate>,
    pub generator: Arc<dyn ImageGenerator>,
    pub settings: Arc<DrawSettings>,
    pub metrics: ServiceMetrics,
}

/// Body of `POST /v1/draw`.
#[derive(Debug, Deserialize)]
pub struct DrawRequest {
    pub user_id: String,
    #[serde(default)]
    pub prompt: String,
    /// Source image; its presence makes this an image-to-image job
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct DrawResponse {
    request_id: String,
    images: Vec<String>,
}

/// Decrements the in-flight gauge when the request finishes or is cancelled.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Run one draw and render the outcome as an HTTP response.
#[instrument(skip_all, fields(request_id = %request_id, user_id = %request.user_id))]
pub async fn handle_draw(state: &DrawState, request: DrawRequest, request_id: String) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlight::enter(&state.metrics.in_flight);
    let started = Instant::now();

    let result = draw(state, request).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(images) => {
            crate::metrics::record_draw("ok", elapsed);
            info!(images = images.len(), elapsed_secs = elapsed, "draw completed");
            (StatusCode::OK, Json(DrawResponse { request_id, images })).into_response()
        }
        Err(e) => failure(state, &e, &request_id, elapsed),
    }
}

/// Reject a request whose body could not be decoded.
pub fn reject_malformed(state: &DrawState, message: String, request_id: &str) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    failure(state, &Error::InvalidRequest(message), request_id, 0.0)
}

fn failure(state: &DrawState, error: &Error, request_id: &str, elapsed: f64) -> Response {
    state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
    crate::metrics::record_draw(error.kind(), elapsed);
    warn!(request_id, kind = error.kind(), error = %error, "draw failed");
    error_response(error.status(), error.kind(), &error.to_string(), request_id)
}

async fn draw(state: &DrawState, request: DrawRequest) -> Result<Vec<String>, Error> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(Error::InvalidRequest("user_id is required".into()));
    }

    let prompt = request.prompt.trim().to_string();
    let image_url = request
        .image_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());
    if prompt.is_empty() && image_url.is_none() {
        return Err(Error::InvalidRequest(
            "prompt is empty and no source image was given".into(),
        ));
    }

    let _slot = state.gate.acquire(user_id).await?;

    let settings = &state.settings;
    let job = GenerationRequest {
        model: settings.model.clone(),
        prompt,
        resolution: settings.resolution.clone(),
        ratio: settings.ratio.clone(),
        image_url,
    };

    match &state.credentials {
        Credentials::StaticKey(key) => {
            debug!(generator = state.generator.id(), "drawing with static key");
            Ok(state.generator.generate(key.expose(), &job).await?)
        }
        Credentials::Pool(store) => {
            let account = store
                .get_available_account(settings.cost)
                .await
                .ok_or(Error::NoAccountAvailable {
                    cost: settings.cost,
                })?;
            debug!(
                email = %account.email,
                credit = account.credit,
                generator = state.generator.id(),
                "selected account"
            );

            let images = state
                .generator
                .generate(&account.session_token, &job)
                .await?;

            store.update_credit(&account.email, settings.cost).await;
            info!(email = %account.email, cost = settings.cost, "debited account for draw");
            Ok(images)
        }
    }
}
