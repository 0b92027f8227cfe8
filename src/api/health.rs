//! Health check endpoints

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Current status of the service
    pub status: String,
    /// Version of the service
    pub version: String,
    /// Seconds since the server started
    pub uptime_seconds: u64,
}

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Pin the uptime origin; called once at startup
pub fn mark_started() {
    STARTED_AT.get_or_init(Instant::now);
}

fn response(status: &str) -> HealthResponse {
    HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: STARTED_AT.get_or_init(Instant::now).elapsed().as_secs(),
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(response("healthy"))
}

/// Readiness check endpoint (checks store connectivity)
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 500, description = "Store unreachable", body = HealthResponse)
    )
)]
pub async fn readiness_check(
    State(state): State<crate::AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.services.ping().await {
        Ok(()) => (StatusCode::OK, Json(response("ready"))),
        Err(e) => {
            tracing::error!(error = %e, "Readiness check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response("unavailable")))
        }
    }
}
