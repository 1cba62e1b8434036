//! Version and health endpoints (unauthenticated).
//!
//! # Endpoints
//!
//! - `GET /api/version` - Application name and version
//! - `GET /api/health` - Snapshot of the running instance

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, VersionResponse};
use crate::state::AppState;

/// Version endpoint.
///
/// # Response Body
///
/// ```json
/// { "name": "api_skeleton", "version": "0.1.0" }
/// ```
#[instrument]
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: crate::APP_NAME.to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Health endpoint.
///
/// Always returns 200 OK while the server is accepting requests.
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        prog_lang: format!("Rust ({})", std::env::consts::ARCH),
        host_name: local_hostname(),
        operating_system: std::env::consts::OS.to_string(),
        time: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        generation: state.generation,
        connections: state.connection_count(),
    })
}

/// Host name of this machine, empty if it cannot be determined.
fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_default()
}
