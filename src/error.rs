use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Startup vs. Request Errors
///
/// Most variants only occur while a run is being assembled (config, TLS,
/// bind) and propagate to the driver, which exits non-zero. `Unauthorized`
/// and `Forbidden` are per-request rejections and never affect the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to parse configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Failed to bind listener on {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not authorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body for API endpoints.
///
/// Only the `error` field is ever sent to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Rejections are logged by the middleware that produced them; everything
        // else is logged here with full detail and sanitized for the client.
        let message = match &self {
            AppError::Unauthorized | AppError::Forbidden => self.to_string(),
            _ => {
                tracing::error!(error = %self, "Request failed");
                "internal server error".to_string()
            }
        };

        (status, axum::Json(ErrorResponse::new(message))).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_error_body_is_sanitized() {
        let response =
            AppError::Internal("/etc/app/secret.key unreadable".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal server error");
        assert!(!String::from_utf8_lossy(&body).contains("secret.key"));
    }

    #[tokio::test]
    async fn test_unauthorized_body() {
        let response = AppError::Unauthorized.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"error":"not authorized"}"#);
    }
}
