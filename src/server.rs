//! # HTTP Server
//!
//! HTTP adapter for rotation events, metrics and probes.
//!
//! Provides endpoints:
//! - `POST /rotate` - Handle one rotation event (`{"SecretId", "ClientRequestToken", "Step"}`)
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 once the rotator is wired up)
//!
//! The server runs on port 5000 by default (configurable via `METRICS_PORT` environment variable).
//!
//! `/rotate` answers `200 {"status":"ok"}` on success. Failures carry an
//! envelope with the error kind and whether redelivery may succeed:
//!
//! | error | status |
//! |---|---|
//! | malformed event, unsupported step | 400 |
//! | version or secret not found | 404 |
//! | conflict, missing/ambiguous current version | 409 |
//! | step failure (retriable) | 503 |

use crate::dispatch;
use crate::error::RotationError;
use crate::event::RotationEvent;
use crate::observability::metrics;
use crate::rotation::Rotator;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct ServerState {
    pub rotator: Arc<Rotator>,
    pub is_ready: Arc<AtomicBool>,
}

/// Body of every `/rotate` response
#[derive(Debug, Serialize)]
pub struct RotateResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retriable: Option<bool>,
}

impl RotateResponse {
    fn ok() -> Self {
        Self {
            status: "ok",
            kind: None,
            message: None,
            retriable: None,
        }
    }

    fn error(kind: &'static str, message: String, retriable: bool) -> Self {
        Self {
            status: "error",
            kind: Some(kind),
            message: Some(message),
            retriable: Some(retriable),
        }
    }
}

/// HTTP status reported for a rotation failure
#[must_use]
pub fn status_for(err: &RotationError) -> StatusCode {
    match err {
        RotationError::UnsupportedStep { .. } => StatusCode::BAD_REQUEST,
        RotationError::NotFound { .. } | RotationError::SecretNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        RotationError::Conflict { .. } | RotationError::MissingCurrentVersion { .. } => {
            StatusCode::CONFLICT
        }
        RotationError::Step { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Router with all endpoints, without binding a listener
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/rotate", post(rotate_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn rotate_handler(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> (StatusCode, Json<RotateResponse>) {
    let event = match RotationEvent::from_json(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejecting malformed rotation event: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(RotateResponse::error(
                    "malformed_event",
                    format!("invalid rotation event: {e}"),
                    false,
                )),
            );
        }
    };

    match dispatch::handle(&state.rotator, &event).await {
        Ok(()) => (StatusCode::OK, Json(RotateResponse::ok())),
        Err(e) => (
            status_for(&e),
            Json(RotateResponse::error(e.kind(), e.to_string(), e.is_retriable())),
        ),
    }
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CurrentVersionProblem;
    use crate::event::RotationStep;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                RotationError::UnsupportedStep {
                    step: "rollbackSecret".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                RotationError::NotFound {
                    secret_id: "db-pass".to_string(),
                    token: "v2".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                RotationError::MissingCurrentVersion {
                    secret_id: "db-pass".to_string(),
                    problem: CurrentVersionProblem::Missing,
                },
                StatusCode::CONFLICT,
            ),
            (
                RotationError::step(RotationStep::Test, "db-pass", anyhow::anyhow!("refused")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{err}");
        }
    }

    #[test]
    fn test_ok_response_has_only_status() {
        let body = serde_json::to_value(RotateResponse::ok()).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }
}
