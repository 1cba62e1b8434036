//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │    IP Filter     │ ← 403 if the peer address is filtered
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets/propagates X-Request-Id
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers, preflight
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401, /api/monitoring only
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! - `GET /api/version`, `GET /api/health` - public
//! - `GET /api/monitoring` - API key or bearer token
//! - `GET /swagger/`, `GET /swagger/doc.json` - development mode only
//! - `OPTIONS` on any path - answered without authentication

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ErrorResponse;
use crate::handlers;
use crate::middleware::{AuthConfig, Authorize, IpFilterLayer, IpRules, REQUEST_ID_HEADER};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let auth = AuthConfig::from_config(config);
    info!(
        api_key = config.api_key_enabled(),
        jwt = config.jwt_enabled(),
        "Authentication configured for /api/monitoring"
    );
    if !config.api_key_enabled() && !config.jwt_enabled() {
        info!("No credentials configured, /api/monitoring rejects every request");
    }

    let mut router = Router::new()
        .route("/api/version", get(handlers::version))
        .route("/api/health", get(handlers::health))
        .route(
            "/api/monitoring",
            get(handlers::monitoring).layer(Authorize::new(auth)),
        );

    if config.is_dev() {
        info!("Development mode, serving /swagger/");
        router = router
            .route("/swagger/", get(handlers::swagger::index))
            .route("/swagger/doc.json", get(handlers::swagger::doc));
    }

    let rules = IpRules::new(&config.webserver.allowed_ips, &config.webserver.blocked_ips);
    let cors = build_cors_layer(&config.cors_allowed_origins);

    router
        .fallback(fallback)
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                request_id = %request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(IpFilterLayer::new(rules))
        .with_state(state)
}

/// `OPTIONS` on unknown paths succeeds; anything else is 404.
async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    (StatusCode::NOT_FOUND, axum::Json(ErrorResponse::new("not found"))).into_response()
}

/// Build CORS layer from configuration.
///
/// `*` allows any origin; otherwise only the listed origins are allowed.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
