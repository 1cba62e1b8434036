//! TLS material resolution and server configuration.
//!
//! # Flow
//!
//! ```text
//! Config ──► provision::resolve ──► TlsMaterial ──► policy::server_config ──► rustls::ServerConfig
//!               │                                        │
//!               ├─ dev: embedded pair                    ├─ min protocol version
//!               ├─ .pfx/.p12: PKCS12 + password          └─ cipher pinning ("1.2")
//!               ├─ otherwise: PEM cert + key
//!               └─ any failure: embedded pair (warn)
//! ```

pub mod policy;
pub mod provision;

pub use policy::{MinTlsVersion, pinned_cipher_suites, server_config};
pub use provision::{EMBEDDED, MaterialSource, PemPair, TlsMaterial, resolve};
