//! HTTP middleware for client filtering and authentication.
//!
//! - **IP Filter**: allow/block lists of addresses and CIDR networks, applied
//!   to every route
//! - **Authentication**: API key or HS256 bearer token, applied to protected
//!   routes
//!
//! # Architecture
//!
//! ```text
//! Request → IP Filter → Request ID → Trace → CORS → Auth → Handler
//!              ↓                                     ↓
//!        403 forbidden                        401 not authorized
//! ```
//!
//! Request IDs come from `tower_http::request_id` using the
//! [`REQUEST_ID_HEADER`] header.

pub mod auth;
pub mod ip_filter;

pub use auth::{AuthConfig, AuthDecision, Authorize, Principal, authorize};
pub use ip_filter::{CidrRange, IpFilterLayer, IpRules};

/// Header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
