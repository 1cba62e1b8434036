//! Run assembly and the signal-driven state machine.
//!
//! ```text
//!            SIGHUP                 drain ≤ 5s, cleanup
//! Running ───────────► Draining ─────────────────────────► restart fired
//!    │       SIGTERM       ▲         drain ≤ 5s, cleanup
//!    ├─────────────────────┘ ────────────────────────────► shutdown fired
//!    │       SIGINT                  cleanup
//!    └─────────────────────────────────────────────────────► shutdown fired
//! ```
//!
//! Each run consumes exactly one signal. Completion is reported through two
//! oneshot channels held in [`CompletionSignals`]; firing consumes the
//! struct, so neither channel can be fired twice.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::lifecycle::signals::{LifecycleSignal, SignalSource};
use crate::listener::Listener;
use crate::metrics;
use crate::routes::build_router;
use crate::state::AppState;
use crate::tls::{self, EMBEDDED};

/// Deadline for in-flight requests after a restart or graceful shutdown.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// How a run ended, as seen by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Reload the config and start the next run.
    Restart,
    /// Exit the process.
    Shutdown,
    /// The server stopped on its own; exit with an error.
    Failed(String),
}

/// Single-use restart and shutdown notifications.
struct CompletionSignals {
    restart: oneshot::Sender<()>,
    shutdown: oneshot::Sender<Option<String>>,
}

impl CompletionSignals {
    fn new() -> (Self, CompletionReceivers) {
        let (restart_tx, restart_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            Self {
                restart: restart_tx,
                shutdown: shutdown_tx,
            },
            CompletionReceivers {
                restart: restart_rx,
                shutdown: shutdown_rx,
            },
        )
    }

    fn fire_restart(self) {
        // Receiver gone means the driver stopped waiting; nothing to notify.
        let _ = self.restart.send(());
    }

    fn fire_shutdown(self, failure: Option<String>) {
        let _ = self.shutdown.send(failure);
    }
}

struct CompletionReceivers {
    restart: oneshot::Receiver<()>,
    shutdown: oneshot::Receiver<Option<String>>,
}

/// Starts runs and numbers them.
#[derive(Debug, Default)]
pub struct Coordinator {
    generation: u64,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Build routes, resolve TLS, bind and start serving.
    ///
    /// The returned run is in the `Running` state and reacts to the first
    /// signal from `signals`.
    ///
    /// # Errors
    ///
    /// Fails if the embedded certificate is invalid, rustls rejects the
    /// configuration, or the listener cannot be bound.
    pub async fn start<S: SignalSource>(
        &mut self,
        config: Config,
        signals: S,
    ) -> AppResult<RunningApp> {
        self.launch(config, signals, build_router).await
    }

    /// Start a run serving the router produced by `routes`.
    async fn launch<S, F>(&mut self, config: Config, signals: S, routes: F) -> AppResult<RunningApp>
    where
        S: SignalSource,
        F: FnOnce(AppState) -> Router + Send,
    {
        self.generation += 1;
        let generation = self.generation;
        metrics::set_run_generation(generation);

        let min_tls = config.min_tls();
        let material = tls::resolve(
            config.env,
            &config.webserver.cert_file,
            &config.webserver.key_file,
            config.webserver.cert_password.value(),
            EMBEDDED,
        )?;
        let rustls = RustlsConfig::from_config(Arc::new(tls::server_config(material, min_tls)?));

        if let Some(addr) = config.metrics_addr() {
            metrics::try_init_metrics(addr);
        }

        let mut listener = Listener::bind(&config.server_addr())?;
        let local_addr = listener.local_addr();

        let state = AppState::new(config, generation);
        let router = routes(state.clone());

        let socket = listener
            .take()
            .ok_or_else(|| AppError::LifecycleError("listener already handed out".to_string()))?;

        let handle = state.server.clone();
        let cancel = state.cancellation_token();
        let server = state.tracker().spawn(async move {
            let serve = axum_server::from_tcp_rustls(socket, rustls)
                .handle(handle)
                .serve(router.into_make_service_with_connect_info::<SocketAddr>());
            tokio::select! {
                result = serve => result,
                () = cancel.cancelled() => Ok(()),
            }
        });

        info!(
            address = %local_addr,
            generation,
            adopted = listener.is_adopted(),
            "Server started"
        );
        info!("API endpoints:");
        info!("  GET  /api/version     - Application name and version");
        info!("  GET  /api/health      - Health snapshot");
        info!("  GET  /api/monitoring  - Monitoring entries (auth)");

        let (completion, receivers) = CompletionSignals::new();
        let run = Run {
            state,
            listener,
            server,
        };
        let supervisor = tokio::spawn(supervise(signals, run, completion));

        Ok(RunningApp {
            local_addr,
            generation,
            receivers,
            supervisor,
        })
    }
}

/// A serving run, handed to the driver.
pub struct RunningApp {
    local_addr: SocketAddr,
    generation: u64,
    receivers: CompletionReceivers,
    supervisor: JoinHandle<()>,
}

impl RunningApp {
    /// Address the server accepts connections on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until the run has fully stopped.
    ///
    /// Resolves after the listener stopped accepting, in-flight requests had
    /// their drain window, and cleanup ran.
    pub async fn completion(self) -> Completion {
        let CompletionReceivers {
            mut restart,
            mut shutdown,
        } = self.receivers;

        let completion = tokio::select! {
            Ok(()) = &mut restart => Completion::Restart,
            Ok(failure) = &mut shutdown => match failure {
                None => Completion::Shutdown,
                Some(reason) => Completion::Failed(reason),
            },
            else => Completion::Failed("lifecycle supervisor exited without completing".to_string()),
        };

        if let Err(e) = self.supervisor.await {
            error!(error = %e, "Lifecycle supervisor panicked");
        }
        completion
    }
}

/// Resources owned by the supervisor for one run.
struct Run {
    state: AppState,
    listener: Listener,
    server: JoinHandle<io::Result<()>>,
}

/// Wait for one signal (or a server failure) and execute the transition.
async fn supervise<S: SignalSource>(
    mut signals: S,
    mut run: Run,
    completion: CompletionSignals,
) {
    let signal = tokio::select! {
        signal = signals.recv() => signal.unwrap_or_else(|| {
            warn!("Signal source closed, shutting down");
            LifecycleSignal::GracefulShutdown
        }),
        result = &mut run.server => {
            let reason = match result {
                Ok(Ok(())) => "server stopped unexpectedly".to_string(),
                Ok(Err(e)) => format!("server error: {e}"),
                Err(e) => format!("server task failed: {e}"),
            };
            error!(reason = %reason, "Server exited while running");
            cleanup(&mut run).await;
            completion.fire_shutdown(Some(reason));
            return;
        }
    };
    // Further signals belong to the next run's registration.
    drop(signals);

    metrics::record_lifecycle_transition(signal.as_str());

    match signal {
        LifecycleSignal::Restart => {
            info!(generation = run.state.generation, "Restart requested, draining");
            drain(&mut run).await;
            cleanup(&mut run).await;
            info!("Restarting");
            completion.fire_restart();
        }
        LifecycleSignal::GracefulShutdown => {
            warn!(generation = run.state.generation, "Graceful shutdown requested, draining");
            drain(&mut run).await;
            cleanup(&mut run).await;
            info!("Shutdown complete");
            completion.fire_shutdown(None);
        }
        LifecycleSignal::Terminate => {
            warn!(generation = run.state.generation, "Terminate requested, stopping immediately");
            run.state.server.shutdown();
            run.server.abort();
            cleanup(&mut run).await;
            info!("Shutdown complete");
            completion.fire_shutdown(None);
        }
    }
}

/// Stop accepting and give in-flight requests [`DRAIN_DEADLINE`] to finish.
async fn drain(run: &mut Run) {
    run.state.server.graceful_shutdown(Some(DRAIN_DEADLINE));

    match tokio::time::timeout(DRAIN_DEADLINE, &mut run.server).await {
        Ok(Ok(Ok(()))) => {
            info!("Drain completed");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "Server failed while draining");
        }
        Ok(Err(e)) => {
            error!(error = %e, "Server task failed while draining");
        }
        Err(_) => {
            error!(
                deadline_secs = DRAIN_DEADLINE.as_secs(),
                connections = run.state.connection_count(),
                "Drain deadline exceeded, closing remaining connections"
            );
            metrics::record_drain_timeout();
            run.state.server.shutdown();
            run.server.abort();
        }
    }
}

/// Release run resources. Failures are logged and do not stop the transition.
async fn cleanup(run: &mut Run) {
    if let Err(e) = run.state.shutdown().await {
        error!(error = %e, "Cleanup incomplete");
    }
    run.listener.close();
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::time::Instant;
    use tokio::sync::{Notify, mpsc};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.webserver.listen_host = "127.0.0.1".to_string();
        config.webserver.listen_port = 0;
        config
    }

    #[tokio::test]
    async fn test_completion_signals_fire_once() {
        let (signals, mut receivers) = CompletionSignals::new();
        signals.fire_shutdown(None);

        assert_eq!(receivers.shutdown.try_recv().unwrap(), None);
        // The restart sender was consumed together with the shutdown sender.
        assert!(receivers.restart.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_then_next_generation() {
        let mut coordinator = Coordinator::new();
        let (tx, rx) = mpsc::channel(1);

        let running = coordinator.start(test_config(), rx).await.unwrap();
        assert_eq!(running.generation(), 1);

        tx.send(LifecycleSignal::Restart).await.unwrap();
        assert_eq!(running.completion().await, Completion::Restart);

        let (tx, rx) = mpsc::channel(1);
        let running = coordinator.start(test_config(), rx).await.unwrap();
        assert_eq!(running.generation(), 2);

        tx.send(LifecycleSignal::GracefulShutdown).await.unwrap();
        assert_eq!(running.completion().await, Completion::Shutdown);
    }

    #[tokio::test]
    async fn test_terminate_ignores_later_signals() {
        let mut coordinator = Coordinator::new();
        let (tx, rx) = mpsc::channel(2);

        let running = coordinator.start(test_config(), rx).await.unwrap();
        tx.send(LifecycleSignal::Terminate).await.unwrap();
        // Either queued behind the first signal or refused once the source is
        // dropped; it must not produce a second completion.
        let _ = tx.send(LifecycleSignal::GracefulShutdown).await;

        assert_eq!(running.completion().await, Completion::Shutdown);
    }

    #[tokio::test]
    async fn test_closed_source_shuts_down() {
        let mut coordinator = Coordinator::new();
        let (tx, rx) = mpsc::channel::<LifecycleSignal>(1);

        let running = coordinator.start(test_config(), rx).await.unwrap();
        drop(tx);

        assert_eq!(running.completion().await, Completion::Shutdown);
    }

    #[tokio::test]
    async fn test_bind_failure_propagates() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config();
        config.webserver.listen_port = occupied.local_addr().unwrap().port();

        let (_tx, rx) = mpsc::channel(1);
        let result = Coordinator::new().start(config, rx).await;
        assert!(matches!(result, Err(AppError::BindError { .. })));
    }

    /// Application routes plus `/slow`, which signals `entered` and then
    /// sleeps for `delay` before answering.
    fn with_slow_route(
        delay: Duration,
        entered: Arc<Notify>,
    ) -> impl FnOnce(AppState) -> Router + Send {
        move |state| {
            build_router(state).route(
                "/slow",
                get(move || {
                    let entered = entered.clone();
                    async move {
                        entered.notify_one();
                        tokio::time::sleep(delay).await;
                        "done"
                    }
                }),
            )
        }
    }

    fn https_client() -> reqwest::Client {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap()
    }

    fn slow_request(
        running: &RunningApp,
    ) -> JoinHandle<Result<String, reqwest::Error>> {
        let url = format!("https://127.0.0.1:{}/slow", running.local_addr().port());
        let client = https_client();
        tokio::spawn(async move { client.get(url).send().await?.text().await })
    }

    #[tokio::test]
    async fn test_restart_lets_in_flight_request_finish() {
        let entered = Arc::new(Notify::new());
        let (tx, rx) = mpsc::channel(1);
        let running = Coordinator::new()
            .launch(
                test_config(),
                rx,
                with_slow_route(Duration::from_millis(500), entered.clone()),
            )
            .await
            .unwrap();

        let request = slow_request(&running);
        entered.notified().await;

        let started = Instant::now();
        tx.send(LifecycleSignal::Restart).await.unwrap();
        assert_eq!(running.completion().await, Completion::Restart);
        assert!(started.elapsed() < DRAIN_DEADLINE);

        assert_eq!(request.await.unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_restart_cuts_slow_request_at_deadline() {
        let entered = Arc::new(Notify::new());
        let (tx, rx) = mpsc::channel(1);
        let running = Coordinator::new()
            .launch(
                test_config(),
                rx,
                with_slow_route(Duration::from_secs(60), entered.clone()),
            )
            .await
            .unwrap();

        let request = slow_request(&running);
        entered.notified().await;

        let started = Instant::now();
        tx.send(LifecycleSignal::Restart).await.unwrap();
        let completion = tokio::time::timeout(Duration::from_secs(6), running.completion())
            .await
            .expect("restart did not complete within 6 seconds");

        assert_eq!(completion, Completion::Restart);
        assert!(started.elapsed() >= DRAIN_DEADLINE - Duration::from_millis(100));

        // The request never gets its answer.
        if let Ok(joined) = tokio::time::timeout(Duration::from_secs(3), request).await {
            assert!(joined.unwrap().is_err());
        }
    }
}
