//! HTTP endpoints for scraping and liveness probes.
//!
//! - `GET /metrics`: Prometheus text exposition.
//! - `GET /healthz`: `200 OK` while healthy, `500` once shutdown began.
//!
//! The server only reads shared state; it never touches broker sessions.

use std::io;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::server::ServerConfig,
    core::{health::Health, telemetry::Telemetry},
};

#[derive(Clone)]
struct ServerState {
    health: Health,
    telemetry: Telemetry,
}

pub fn router(health: Health, telemetry: Telemetry) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(ServerState { health, telemetry })
}

async fn metrics(State(state): State<ServerState>) -> Response {
    match state.telemetry.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn healthz(State(state): State<ServerState>) -> Response {
    if state.health.is_healthy() {
        (StatusCode::OK, "OK").into_response()
    } else {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Binds `config.bind` and serves until `shutdown` fires.
pub async fn serve(
    config: &ServerConfig,
    health: Health,
    telemetry: Telemetry,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(bind = %config.bind, "HTTP server listening");

    axum::serve(listener, router(health, telemetry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
