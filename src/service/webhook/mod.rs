//! Inbound webhook boundary built on axum.
//!
//! Probe handling, signature checks, and batch parsing live here; everything
//! after a successful parse is acknowledged with 200 regardless of per-event
//! outcomes, so the platform never retries because of an internal failure.

pub mod signature;

use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, instrument, warn};

use crate::{
    base::types::{Void, WebhookBatch},
    interaction::webhook_batch::handle_webhook_batch,
    runtime::Runtime,
    service::db::FailureRecord,
};

use signature::SignatureVerifier;

/// Bodies shorter than this are reachability probes: acknowledged without any checks.
pub const PROBE_BODY_LIMIT: usize = 10;

/// Bodies shorter than this that fail verification are still acknowledged as probes.
pub const AMBIGUOUS_PROBE_LIMIT: usize = 100;

/// Header carrying the base64 HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Failure record kind for bodies that could not be parsed into a batch.
pub const WEBHOOK_PROCESSING_ERROR: &str = "WebhookProcessingError";

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct WebhookState {
    runtime: Runtime,
    verifier: SignatureVerifier,
}

/// Build the router: `POST /webhook`, plus `GET /` and `GET /health`, open to any origin.
pub fn router(runtime: Runtime) -> Router {
    let verifier = SignatureVerifier::new(&runtime.channel_secret);
    let state = WebhookState { runtime, verifier };

    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/webhook", post(post_webhook))
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind to the configured address and serve until Ctrl-C.
pub async fn serve(runtime: Runtime) -> Void {
    let addr = format!("{}:{}", runtime.config.host, runtime.config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Webhook server listening on {addr}");

    axum::serve(listener, router(runtime)).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", err);
    }

    info!("Shutting down ...");
}

// Handlers.

async fn get_root() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "mention-relay" }))
}

async fn get_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Handles a webhook delivery.
#[instrument(skip_all, fields(bytes = body.len()))]
async fn post_webhook(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    // Reachability probes carry (almost) nothing.

    if body.len() < PROBE_BODY_LIMIT {
        info!("Received verification request.");
        return StatusCode::OK.into_response();
    }

    // Authenticate.

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    if let Err(err) = state.verifier.verify(&body, signature) {
        warn!("Signature verification failed: {}", err);

        if body.len() < AMBIGUOUS_PROBE_LIMIT {
            return StatusCode::OK.into_response();
        }

        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": err.to_string() }))).into_response();
    }

    // Parse.

    let batch = match serde_json::from_slice::<WebhookBatch>(&body) {
        Ok(batch) => batch,
        Err(err) => {
            let record = FailureRecord::new(WEBHOOK_PROCESSING_ERROR, err.to_string()).with_payload(String::from_utf8_lossy(&body));
            state.runtime.db.log_failure(record).await;

            // Still acknowledge, so the platform does not redeliver a body that will never parse.
            return StatusCode::OK.into_response();
        }
    };

    // Process.

    handle_webhook_batch(batch, state.runtime.clone()).await;

    StatusCode::OK.into_response()
}

/// Log every request with its status and elapsed time.
async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    info!("Request: {} {}", method, path);

    let response = next.run(request).await;

    info!("Response: {} {} -> {} ({:.4}s)", method, path, response.status().as_u16(), started.elapsed().as_secs_f64());

    response
}
