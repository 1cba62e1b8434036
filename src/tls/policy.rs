//! Minimum protocol version and cipher suite policy.

use std::sync::Arc;

use rustls::crypto::aws_lc_rs::{self, cipher_suite};
use rustls::{ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::tls::TlsMaterial;

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Configured `minTLS` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinTlsVersion {
    /// "1.0", served as TLS 1.2.
    Tls10,
    /// "1.1", served as TLS 1.2.
    Tls11,
    /// "1.2", restricted to the pinned AEAD suites.
    Tls12,
    /// "1.2a", provider default suites.
    Tls12Any,
    /// "" or "1.3".
    #[default]
    Tls13,
}

impl MinTlsVersion {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1.0" => Some(MinTlsVersion::Tls10),
            "1.1" => Some(MinTlsVersion::Tls11),
            "1.2" => Some(MinTlsVersion::Tls12),
            "1.2a" => Some(MinTlsVersion::Tls12Any),
            "" | "1.3" => Some(MinTlsVersion::Tls13),
            _ => None,
        }
    }

    fn protocol_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            MinTlsVersion::Tls13 => TLS13_ONLY,
            _ => rustls::ALL_VERSIONS,
        }
    }
}

/// Suites allowed with `minTLS: "1.2"`.
///
/// ECDHE key exchange with AES-GCM or ChaCha20-Poly1305 for TLS 1.2. TLS 1.3
/// suites are AEAD only and stay enabled.
pub fn pinned_cipher_suites() -> Vec<SupportedCipherSuite> {
    vec![
        cipher_suite::TLS13_AES_256_GCM_SHA384,
        cipher_suite::TLS13_AES_128_GCM_SHA256,
        cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ]
}

/// Build the rustls server configuration for `material` under `min_tls`.
///
/// # Errors
///
/// Returns `AppError::TlsError` if rustls rejects the version set or the
/// certificate/key pair.
pub fn server_config(material: TlsMaterial, min_tls: MinTlsVersion) -> AppResult<ServerConfig> {
    let mut provider = aws_lc_rs::default_provider();

    match min_tls {
        MinTlsVersion::Tls10 | MinTlsVersion::Tls11 => {
            warn!(min_tls = ?min_tls, "TLS below 1.2 is not supported, using TLS 1.2");
        }
        MinTlsVersion::Tls12 => {
            info!("Using TLS 1.2 with secure ciphers");
            provider.cipher_suites = pinned_cipher_suites();
        }
        MinTlsVersion::Tls12Any => info!("Using TLS 1.2"),
        MinTlsVersion::Tls13 => info!("Using TLS 1.3"),
    }

    let mut config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(min_tls.protocol_versions())
        .map_err(|e| AppError::TlsError(format!("unsupported protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(material.cert_chain, material.key)
        .map_err(|e| AppError::TlsError(format!("certificate rejected: {e}")))?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}
