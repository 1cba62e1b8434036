//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGHUP, SIGTERM, SIGINT)
//! - Translate platform signals into [`LifecycleSignal`] values
//!
//! Handlers are registered per run: the driver calls [`OsSignals::register`]
//! before each start, and the coordinator drops the registration once it has
//! consumed one signal.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::{AppError, AppResult};

/// Lifecycle request produced by the signal layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// SIGHUP: drain, reload config, start again.
    Restart,
    /// SIGTERM: drain, then exit.
    GracefulShutdown,
    /// SIGINT: stop immediately, then exit.
    Terminate,
}

impl LifecycleSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleSignal::Restart => "restart",
            LifecycleSignal::GracefulShutdown => "graceful_shutdown",
            LifecycleSignal::Terminate => "terminate",
        }
    }
}

/// Source of lifecycle signals for one run.
///
/// `recv` resolves with the next signal, or `None` once the source is closed.
pub trait SignalSource: Send + 'static {
    fn recv(&mut self) -> impl Future<Output = Option<LifecycleSignal>> + Send;
}

/// Process signals delivered by the operating system.
#[cfg(unix)]
pub struct OsSignals {
    hangup: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    /// Register handlers for SIGHUP, SIGTERM and SIGINT.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LifecycleError` if a handler cannot be installed.
    pub fn register() -> AppResult<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                AppError::LifecycleError(format!("cannot install {name} handler: {e}"))
            })
        };

        Ok(Self {
            hangup: install(SignalKind::hangup(), "SIGHUP")?,
            terminate: install(SignalKind::terminate(), "SIGTERM")?,
            interrupt: install(SignalKind::interrupt(), "SIGINT")?,
        })
    }
}

#[cfg(unix)]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<LifecycleSignal> {
        tokio::select! {
            Some(()) = self.hangup.recv() => Some(LifecycleSignal::Restart),
            Some(()) = self.terminate.recv() => Some(LifecycleSignal::GracefulShutdown),
            Some(()) = self.interrupt.recv() => Some(LifecycleSignal::Terminate),
            else => None,
        }
    }
}

/// Ctrl+C only; there is no hangup or terminate signal to listen for.
#[cfg(not(unix))]
pub struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    pub fn register() -> AppResult<Self> {
        Ok(Self)
    }
}

#[cfg(not(unix))]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<LifecycleSignal> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(LifecycleSignal::Terminate),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                None
            }
        }
    }
}

/// Channel-fed signals, used to drive the lifecycle programmatically.
impl SignalSource for mpsc::Receiver<LifecycleSignal> {
    async fn recv(&mut self) -> Option<LifecycleSignal> {
        mpsc::Receiver::recv(self).await
    }
}
