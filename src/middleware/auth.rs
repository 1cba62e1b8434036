//! API key and bearer token authentication.
//!
//! Two independent checks run in order and the first success wins:
//!
//! 1. **API key**: the `X-Api-Key` header equals the configured `apiKey`.
//!    Principal: `apikey`.
//! 2. **Bearer token**: only when `jwtSecret` and `jwtID` are both set. The
//!    `Authorization` header must be exactly `Bearer <token>` and the token
//!    must pass [`crate::jwt::validate_token`]. Principal: the `user` claim.
//!
//! Requests that pass neither check get `401 {"error":"not authorized"}` and
//! never reach the wrapped handler. Authenticated requests carry a
//! [`Principal`] extension.
//!
//! ```bash
//! curl -k -H "X-Api-Key: your-secret-key" https://localhost:4443/api/monitoring
//! curl -k -H "Authorization: Bearer eyJhbGciOi..." https://localhost:4443/api/monitoring
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request, Response};
use axum::response::IntoResponse;
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::jwt;
use crate::metrics;

/// Header name for API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Principal recorded for API key authentication.
pub const API_KEY_PRINCIPAL: &str = "apikey";

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    pub authenticated: bool,
    pub principal: String,
}

impl AuthDecision {
    fn granted(principal: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            principal: principal.into(),
        }
    }

    fn denied() -> Self {
        Self {
            authenticated: false,
            principal: String::new(),
        }
    }
}

/// Identity of an authenticated caller, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

/// Credentials the middleware checks against. Immutable for one run.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub api_key: String,
    pub jwt_secret: String,
    pub jwt_id: String,
    /// Expected `aud` claim (application name).
    pub audience: String,
}

impl AuthConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.api_key.value().to_string(),
            jwt_secret: config.jwt_secret.value().to_string(),
            jwt_id: config.jwt_id.clone(),
            audience: crate::APP_NAME.to_string(),
        }
    }

    fn jwt_enabled(&self) -> bool {
        !self.jwt_secret.is_empty() && !self.jwt_id.is_empty()
    }
}

/// Decide whether a request with `headers` is authenticated.
pub fn authorize(headers: &HeaderMap, config: &AuthConfig) -> AuthDecision {
    if !config.api_key.is_empty()
        && let Some(provided) = header_str(headers, API_KEY_HEADER)
        && constant_time_eq(provided, &config.api_key)
    {
        return AuthDecision::granted(API_KEY_PRINCIPAL);
    }

    if config.jwt_enabled()
        && let Some(token) = bearer_token(headers)
    {
        match jwt::validate_token(token, &config.audience, &config.jwt_id, &config.jwt_secret) {
            Ok(claims) => return AuthDecision::granted(claims.user),
            Err(_) => debug!("Bearer token rejected"),
        }
    }

    AuthDecision::denied()
}

/// Authentication layer for protected routes.
#[derive(Clone)]
pub struct Authorize {
    config: Arc<AuthConfig>,
}

impl Authorize {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for Authorize {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct AuthorizeService<S> {
    inner: S,
    config: Arc<AuthConfig>,
}

impl<S> Service<Request<Body>> for AuthorizeService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let decision = authorize(req.headers(), &self.config);

        if !decision.authenticated {
            let reason = if has_credentials(req.headers()) {
                "invalid_credentials"
            } else {
                "missing_credentials"
            };
            warn!(path = %req.uri().path(), reason, "Request not authorized");
            metrics::record_auth_rejection(reason);
            return Box::pin(async { Ok(AppError::Unauthorized.into_response()) });
        }

        debug!(principal = %decision.principal, "Request authorized");
        req.extensions_mut().insert(Principal(decision.principal));

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Token from an `Authorization: Bearer <token>` header.
///
/// The value must split on single spaces into exactly two parts.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = header_str(headers, AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    (scheme == "Bearer" && !token.contains(' ')).then_some(token)
}

fn has_credentials(headers: &HeaderMap) -> bool {
    headers.contains_key(API_KEY_HEADER) || headers.contains_key(AUTHORIZATION)
}

/// Constant-time comparison of two strings.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use axum::Router;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    const SECRET: &str = "jwt-secret";
    const JTI: &str = "jwt-id";

    fn config(api_key: &str, jwt: bool) -> AuthConfig {
        AuthConfig {
            api_key: api_key.to_string(),
            jwt_secret: if jwt { SECRET.to_string() } else { String::new() },
            jwt_id: if jwt { JTI.to_string() } else { String::new() },
            audience: crate::APP_NAME.to_string(),
        }
    }

    fn token(user: &str) -> String {
        jwt::issue_token(user, crate::APP_NAME, SECRET, JTI, Environment::Prod).unwrap()
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_api_key_match() {
        let h = headers(&[("x-api-key", "secret".to_string())]);
        let decision = authorize(&h, &config("secret", false));
        assert_eq!(decision, AuthDecision::granted("apikey"));
    }

    #[test]
    fn test_api_key_short_circuits_jwt() {
        let h = headers(&[
            ("x-api-key", "secret".to_string()),
            ("authorization", "Bearer garbage".to_string()),
        ]);
        let decision = authorize(&h, &config("secret", true));
        assert_eq!(decision.principal, "apikey");
    }

    #[test]
    fn test_wrong_api_key_without_jwt() {
        let h = headers(&[("x-api-key", "wrong".to_string())]);
        assert!(!authorize(&h, &config("secret", false)).authenticated);
    }

    #[test]
    fn test_empty_configured_key_never_matches() {
        let h = headers(&[("x-api-key", String::new())]);
        assert!(!authorize(&h, &config("", false)).authenticated);
    }

    #[test]
    fn test_jwt_principal_is_user_claim() {
        let h = headers(&[("authorization", format!("Bearer {}", token("alice")))]);
        let decision = authorize(&h, &config("", true));
        assert_eq!(decision, AuthDecision::granted("alice"));
    }

    #[test]
    fn test_jwt_falls_back_after_wrong_api_key() {
        let h = headers(&[
            ("x-api-key", "wrong".to_string()),
            ("authorization", format!("Bearer {}", token("carol"))),
        ]);
        assert_eq!(authorize(&h, &config("secret", true)).principal, "carol");
    }

    #[test]
    fn test_jwt_ignored_when_disabled() {
        let h = headers(&[("authorization", format!("Bearer {}", token("alice")))]);
        assert!(!authorize(&h, &config("", false)).authenticated);
    }

    #[test]
    fn test_bearer_header_shape() {
        let t = token("alice");
        let cases = [
            format!("bearer {t}"),
            format!("Bearer  {t}"),
            format!("Bearer {t} extra"),
            t.clone(),
        ];
        for value in cases {
            let h = headers(&[("authorization", value.clone())]);
            assert!(
                !authorize(&h, &config("", true)).authenticated,
                "accepted malformed header {value:?}"
            );
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret123", "secret123"));
        assert!(!constant_time_eq("secret123", "secret456"));
        assert!(!constant_time_eq("short", "much-longer-string"));
    }

    fn app(cfg: AuthConfig) -> Router {
        Router::new()
            .route(
                "/protected",
                get(|Extension(Principal(p)): Extension<Principal>| async move { p }),
            )
            .layer(Authorize::new(cfg))
    }

    #[tokio::test]
    async fn test_layer_rejects_with_401_body() {
        let response = app(config("secret", true))
            .oneshot(Request::get("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"error":"not authorized"}"#);
    }

    #[tokio::test]
    async fn test_layer_passes_principal_to_handler() {
        let response = app(config("secret", false))
            .oneshot(
                Request::get("/protected")
                    .header("x-api-key", "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"apikey");
    }
}
