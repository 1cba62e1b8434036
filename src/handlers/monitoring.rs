//! Monitoring endpoint (authenticated).

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use tracing::{info, instrument};

use crate::middleware::Principal;
use crate::models::{MetricKind, MonitoringEntry};
use crate::state::AppState;

/// Monitoring entries for the external collector.
///
/// `Host` is taken from the request's `Host` header with any port removed.
#[instrument(skip_all)]
pub async fn monitoring(
    State(state): State<AppState>,
    Extension(Principal(principal)): Extension<Principal>,
    headers: HeaderMap,
) -> Json<Vec<MonitoringEntry>> {
    let host = request_host(&headers);
    info!(principal = %principal, host = %host, "Monitoring data requested");

    Json(collect(&state, &host))
}

fn collect(state: &AppState, host: &str) -> Vec<MonitoringEntry> {
    let uptime = state.uptime_seconds();
    #[allow(clippy::cast_precision_loss)]
    let uptime_hours = (uptime / 3600) as f64;
    let connections = state.connection_count() as u64;
    let tracked = state.tracker().len() as u64;

    vec![
        MonitoringEntry::metric(
            "Uptime",
            host,
            MetricKind::Counter,
            uptime_hours,
            format!("Uptime: {uptime_hours}h"),
        ),
        MonitoringEntry::info("Version", host, crate::VERSION),
        MonitoringEntry::info("Prog Lang", host, format!("Rust ({})", std::env::consts::ARCH)),
        MonitoringEntry::info("Operating System", host, std::env::consts::OS),
        MonitoringEntry::metric(
            "Run Generation",
            host,
            MetricKind::Gauge,
            state.generation,
            format!("Run Generation: {}", state.generation),
        ),
        MonitoringEntry::metric(
            "Open Connections",
            host,
            MetricKind::Gauge,
            connections,
            format!("Open Connections: {connections}"),
        ),
        MonitoringEntry::metric(
            "Tracked Tasks",
            host,
            MetricKind::Gauge,
            tracked,
            format!("Tracked Tasks: {tracked}"),
        ),
    ]
}

/// Host header without port; bracketed IPv6 literals keep their address.
fn request_host(headers: &HeaderMap) -> String {
    let raw = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Some(rest) = raw.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    raw.split(':').next().unwrap_or_default().to_string()
}
