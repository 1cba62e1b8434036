//! Listening socket bootstrap.
//!
//! # Responsibilities
//! - Adopt a socket handed over by the service manager (socket activation)
//! - Otherwise bind a fresh TCP listener on the configured address
//! - Hand the socket to the TLS server exactly once
//!
//! # Socket activation
//!
//! When `LISTEN_PID` equals the current process id and `LISTEN_FDS` announces
//! at least one descriptor, descriptor 3 is taken as an already-bound
//! listening socket. It is adopted once per process; every
//! run receives a duplicate, so a restart keeps serving on the same socket.
//!
//! # Ownership
//!
//! The socket lives in an `Option`. [`Listener::take`] moves it into the
//! server, which closes it on shutdown. [`Listener::close`] drops whatever is
//! still owned and is safe to call any number of times.

use std::net::{SocketAddr, TcpListener};
use std::sync::OnceLock;

use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Environment marker set by the service manager.
pub const LISTEN_PID_ENV: &str = "LISTEN_PID";

/// Number of descriptors passed by the service manager.
pub const LISTEN_FDS_ENV: &str = "LISTEN_FDS";

/// First descriptor passed by the service manager.
#[cfg(unix)]
const LISTEN_FDS_START: std::os::unix::io::RawFd = 3;

static ACTIVATED: OnceLock<Option<TcpListener>> = OnceLock::new();

/// A bound listening socket for one run.
#[derive(Debug)]
pub struct Listener {
    inner: Option<TcpListener>,
    adopted: bool,
    local_addr: SocketAddr,
}

impl Listener {
    /// Adopt the activation socket or bind `addr`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BindError` if the address cannot be bound. Bind
    /// failures are not retried.
    pub fn bind(addr: &str) -> AppResult<Self> {
        let bind_err = |source| AppError::BindError {
            addr: addr.to_string(),
            source,
        };

        let (socket, adopted) = match activated_socket() {
            Some(shared) => (shared.try_clone().map_err(bind_err)?, true),
            None => (TcpListener::bind(addr).map_err(bind_err)?, false),
        };

        socket.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        info!(address = %local_addr, adopted, "Listener bound");

        Ok(Self {
            inner: Some(socket),
            adopted,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the socket came from socket activation.
    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    /// Move the socket out for serving. Returns `None` once taken or closed.
    pub fn take(&mut self) -> Option<TcpListener> {
        self.inner.take()
    }

    /// Close the socket if it is still owned here.
    pub fn close(&mut self) {
        if let Some(socket) = self.inner.take() {
            drop(socket);
            info!(address = %self.local_addr, "Listener closed");
        }
    }
}

fn activated_socket() -> Option<&'static TcpListener> {
    ACTIVATED.get_or_init(adopt_from_environment).as_ref()
}

#[cfg(unix)]
fn adopt_from_environment() -> Option<TcpListener> {
    use std::os::unix::io::FromRawFd;

    let listen_pid = std::env::var(LISTEN_PID_ENV).ok();
    let listen_fds = std::env::var(LISTEN_FDS_ENV).ok();
    if !activation_requested(listen_pid.as_deref(), listen_fds.as_deref(), std::process::id()) {
        return None;
    }

    // SAFETY: the service manager passes an open listening socket at
    // LISTEN_FDS_START when LISTEN_PID names this process. The descriptor is
    // wrapped exactly once, guarded by ACTIVATED.
    #[allow(unsafe_code)]
    let socket = unsafe { TcpListener::from_raw_fd(LISTEN_FDS_START) };

    if let Err(e) = socket.local_addr() {
        warn!(error = %e, "Activation descriptor is not a listening socket, ignoring it");
        std::mem::forget(socket);
        return None;
    }

    info!(fd = LISTEN_FDS_START, "Adopted socket from service manager");
    Some(socket)
}

#[cfg(not(unix))]
fn adopt_from_environment() -> Option<TcpListener> {
    None
}

/// Whether the activation markers hand sockets to process `pid`.
#[cfg_attr(not(unix), allow(dead_code))]
fn activation_requested(listen_pid: Option<&str>, listen_fds: Option<&str>, pid: u32) -> bool {
    let pid_matches = listen_pid
        .and_then(|v| v.trim().parse::<u32>().ok())
        .is_some_and(|p| p == pid);
    let has_fds = listen_fds
        .and_then(|v| v.trim().parse::<u32>().ok())
        .is_some_and(|n| n >= 1);
    pid_matches && has_fds
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert!(!listener.is_adopted());
    }

    #[test]
    fn test_take_hands_out_socket_once() {
        let mut listener = Listener::bind("127.0.0.1:0").unwrap();
        assert!(listener.take().is_some());
        assert!(listener.take().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut listener = Listener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        listener.close();
        listener.close();
        assert!(listener.take().is_none());

        // Port is free again after close.
        let rebound = TcpListener::bind(addr);
        assert!(rebound.is_ok());
    }

    #[test]
    fn test_bind_conflict_is_bind_error() {
        let first = Listener::bind("127.0.0.1:0").unwrap();
        let addr = first.local_addr().to_string();

        let result = Listener::bind(&addr);
        assert!(matches!(result, Err(AppError::BindError { .. })));
    }

    #[test]
    fn test_bind_malformed_address() {
        let result = Listener::bind("127.0.0.1");
        assert!(matches!(result, Err(AppError::BindError { .. })));
    }

    #[test]
    fn test_activation_requires_matching_pid_and_fds() {
        assert!(activation_requested(Some("42"), Some("1"), 42));
        assert!(activation_requested(Some(" 42 "), Some("2"), 42));

        assert!(!activation_requested(Some("42"), None, 42));
        assert!(!activation_requested(Some("42"), Some("0"), 42));
        assert!(!activation_requested(Some("41"), Some("1"), 42));
        assert!(!activation_requested(None, Some("1"), 42));
        assert!(!activation_requested(Some("abc"), Some("1"), 42));
    }
}
