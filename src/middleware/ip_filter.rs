//! Client address allow/block filtering.
//!
//! Rules, evaluated against the peer address of the TCP connection:
//!
//! - A match in `blockedIPs` rejects, regardless of `allowedIPs`.
//! - An empty `allowedIPs`, or one containing `ALL`, accepts every address.
//! - Otherwise the address must match an `allowedIPs` entry.
//!
//! Entries are literal addresses (`192.168.0.13`, `::1`) or CIDR networks
//! (`10.0.0.0/8`). Invalid entries are logged and skipped. Rejected requests
//! get `403 {"error":"forbidden"}`.
//!
//! Forwarding headers such as `X-Forwarded-For` are not consulted.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use crate::error::AppError;
use crate::metrics;

/// Allow-list entry that accepts every address.
pub const ALLOW_ALL: &str = "ALL";

/// An IP network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `"10.0.0.0/8"`, `"::1/128"` or a bare address (host route).
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network = canonical(addr.parse::<IpAddr>().ok()?);
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, canonical(*ip)) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix_len)).unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(addr) & mask)
            }
            _ => false,
        }
    }
}

/// IPv4-mapped IPv6 addresses compare as IPv4.
fn canonical(ip: IpAddr) -> IpAddr {
    ip.to_canonical()
}

/// Parsed allow and block lists. Immutable for one run.
#[derive(Debug, Clone, Default)]
pub struct IpRules {
    allow: Vec<CidrRange>,
    allow_all: bool,
    block: Vec<CidrRange>,
}

impl IpRules {
    pub fn new(allowed: &[String], blocked: &[String]) -> Self {
        let allow_all =
            allowed.is_empty() || allowed.iter().any(|a| a.trim().eq_ignore_ascii_case(ALLOW_ALL));

        let allow = if allow_all {
            Vec::new()
        } else {
            parse_list(allowed, "allowedIPs")
        };

        Self {
            allow,
            allow_all,
            block: parse_list(blocked, "blockedIPs"),
        }
    }

    /// Check whether `ip` may proceed. Block wins over allow.
    pub fn is_allowed(&self, ip: &IpAddr) -> bool {
        if self.block.iter().any(|range| range.contains(ip)) {
            return false;
        }
        self.allow_all || self.allow.iter().any(|range| range.contains(ip))
    }

    /// Decision for a connection whose peer address is unknown.
    fn allows_unknown(&self) -> bool {
        self.allow_all && self.block.is_empty()
    }
}

fn parse_list(entries: &[String], key: &str) -> Vec<CidrRange> {
    entries
        .iter()
        .filter_map(|entry| {
            let parsed = CidrRange::parse(entry);
            if parsed.is_none() {
                warn!(entry = %entry, key, "Invalid IP or CIDR entry, skipping");
            }
            parsed
        })
        .collect()
}

/// IP filter layer; apply outermost so rejected requests do no other work.
#[derive(Clone)]
pub struct IpFilterLayer {
    rules: Arc<IpRules>,
}

impl IpFilterLayer {
    pub fn new(rules: IpRules) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }
}

impl<S> Layer<S> for IpFilterLayer {
    type Service = IpFilterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpFilterService {
            inner,
            rules: self.rules.clone(),
        }
    }
}

/// IP filter service wrapper.
#[derive(Clone)]
pub struct IpFilterService<S> {
    inner: S,
    rules: Arc<IpRules>,
}

impl<S> Service<Request<Body>> for IpFilterService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let allowed = match peer {
            Some(ip) => self.rules.is_allowed(&ip),
            None => self.rules.allows_unknown(),
        };

        if !allowed {
            warn!(
                client_ip = %peer.map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
                path = %req.uri().path(),
                "Request from filtered address rejected"
            );
            metrics::record_ip_rejection();
            return Box::pin(async { Ok(AppError::Forbidden.into_response()) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
