//! Shared application state for Axum handlers.
//!
//! One `AppState` exists per run. It is rebuilt from the reloaded config on
//! every restart and never mutated while the run is serving.
//!
//! # Structured Concurrency
//!
//! The server task is spawned on the state's `TaskTracker` and observes its
//! `CancellationToken`. `shutdown()` cancels, closes the tracker and waits
//! (bounded) for tracked tasks to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum_server::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Upper bound for waiting on tracked tasks during cleanup.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared application state for Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration snapshot for this run
    pub config: Arc<Config>,
    /// When this run started
    pub started_at: Instant,
    /// Run number, 1 for the first start
    pub generation: u64,
    /// Server handle driving shutdown and exposing live connections
    pub server: Handle,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, generation: u64) -> Self {
        Self {
            config: Arc::new(config),
            started_at: Instant::now(),
            generation,
            server: Handle::new(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Tracker for tasks that must finish before cleanup completes.
    pub fn tracker(&self) -> &TaskTracker {
        &self.task_tracker
    }

    /// Token cancelled when the run is torn down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Stop all tracked tasks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LifecycleError` if tasks are still running after
    /// the cleanup timeout.
    pub async fn shutdown(&self) -> AppResult<()> {
        debug!(generation = self.generation, "Stopping tracked tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();

        tokio::time::timeout(CLEANUP_TIMEOUT, self.task_tracker.wait())
            .await
            .map_err(|_| {
                AppError::LifecycleError(format!(
                    "{} task(s) still running after {CLEANUP_TIMEOUT:?}",
                    self.task_tracker.len()
                ))
            })?;

        info!(generation = self.generation, "All tracked tasks have completed");
        Ok(())
    }

    /// Get the run uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.server.connection_count()
    }
}
