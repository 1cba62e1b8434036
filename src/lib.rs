//! # API Skeleton
//!
//! An HTTPS API service skeleton with Axum, featuring:
//!
//! - **Lifecycle**: SIGHUP restart with config reload, bounded graceful drain
//!   on SIGTERM, immediate stop on SIGINT
//! - **TLS**: PEM or PKCS12 certificates with an embedded self-signed fallback,
//!   configurable minimum version and cipher pinning
//! - **Security**: API key and JWT authentication, IP allow/block lists,
//!   encrypted secrets in the config file
//! - **Observability**: Request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Driver (main): load config → start run → await completion  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Coordinator: signals → drain / cleanup → restart|shutdown  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Listener (bind or socket activation) + rustls              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (IP Filter → Request ID → Trace → CORS → Auth)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (version, health, monitoring, swagger)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_skeleton::{Completion, Config, Coordinator, OsSignals};
//! use api_skeleton::config::ConfigOverrides;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), api_skeleton::AppError> {
//!     let config = Config::load("config.yaml", &ConfigOverrides::default())?;
//!     let mut coordinator = Coordinator::new();
//!
//!     let running = coordinator.start(config, OsSignals::register()?).await?;
//!     if let Completion::Restart = running.completion().await {
//!         // reload and start again...
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod crypt;
pub mod error;
pub mod handlers;
pub mod jwt;
pub mod lifecycle;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod tls;

/// Application name, used as the JWT audience and in `/api/version`.
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use lifecycle::{Completion, Coordinator, LifecycleSignal, OsSignals, RunningApp};
pub use routes::build_router;
pub use state::AppState;
