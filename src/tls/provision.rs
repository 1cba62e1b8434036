//! Loading certificate chains and private keys.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{info, warn};

use crate::config::Environment;
use crate::error::{AppError, AppResult};

/// A PEM encoded certificate chain and private key held in memory.
#[derive(Debug, Clone, Copy)]
pub struct PemPair<'a> {
    pub cert: &'a [u8],
    pub key: &'a [u8],
}

/// Self-signed `localhost` pair compiled into the binary.
pub const EMBEDDED: PemPair<'static> = PemPair {
    cert: include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/certs/selfsigned.crt")),
    key: include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/certs/selfsigned.key")),
};

/// Where the active certificate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialSource {
    Embedded,
    Pem,
    Pkcs12,
}

/// Certificate chain and private key ready for the TLS configuration.
#[derive(Debug)]
pub struct TlsMaterial {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
    pub source: MaterialSource,
}

impl TlsMaterial {
    /// Decode an in-memory PEM pair.
    pub fn from_pem(pair: PemPair<'_>, source: MaterialSource) -> AppResult<Self> {
        let cert_chain = rustls_pemfile::certs(&mut BufReader::new(pair.cert))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::TlsError(format!("invalid certificate PEM: {e}")))?;

        let key = rustls_pemfile::private_key(&mut BufReader::new(pair.key))
            .map_err(|e| AppError::TlsError(format!("invalid key PEM: {e}")))?
            .ok_or_else(|| AppError::TlsError("no private key found".to_string()))?;

        Self::checked(cert_chain, key, source)
    }

    /// Decode a PKCS12 bundle holding the key and its chain.
    pub fn from_pkcs12(data: &[u8], password: &str) -> AppResult<Self> {
        let store = p12_keystore::KeyStore::from_pkcs12(data, password)
            .map_err(|e| AppError::TlsError(format!("invalid PKCS12 bundle: {e}")))?;

        let (alias, chain) = store
            .private_key_chain()
            .ok_or_else(|| AppError::TlsError("PKCS12 bundle has no private key".to_string()))?;

        let cert_chain = chain
            .chain()
            .iter()
            .map(|cert| CertificateDer::from(cert.as_der().to_vec()))
            .collect();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(chain.key().to_vec()));

        tracing::debug!(alias = %alias, "Decoded PKCS12 key entry");
        Self::checked(cert_chain, key, MaterialSource::Pkcs12)
    }

    /// Reject empty chains and keys the crypto provider cannot use.
    fn checked(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        source: MaterialSource,
    ) -> AppResult<Self> {
        if cert_chain.is_empty() {
            return Err(AppError::TlsError("no certificate found".to_string()));
        }

        rustls::crypto::aws_lc_rs::default_provider()
            .key_provider
            .load_private_key(key.clone_key())
            .map_err(|e| AppError::TlsError(format!("unusable private key: {e}")))?;

        Ok(Self {
            cert_chain,
            key,
            source,
        })
    }
}

/// Decode the embedded fallback pair.
pub fn embedded_material(embedded: PemPair<'_>) -> AppResult<TlsMaterial> {
    TlsMaterial::from_pem(embedded, MaterialSource::Embedded)
}

/// Resolve the TLS material for this run.
///
/// Development mode always uses `embedded`. In production the configured
/// files are loaded; if that fails for any reason the embedded pair is used
/// instead and a warning is logged.
///
/// # Errors
///
/// Returns `AppError::TlsError` only when the embedded pair itself is invalid.
pub fn resolve(
    env: Environment,
    cert_path: &str,
    key_path: &str,
    password: &str,
    embedded: PemPair<'_>,
) -> AppResult<TlsMaterial> {
    if env == Environment::Dev {
        info!("Development mode, using embedded certificate");
        return embedded_material(embedded);
    }

    match load_files(cert_path, key_path, password) {
        Ok(material) => {
            info!(cert = %cert_path, source = ?material.source, "Loaded TLS certificate");
            Ok(material)
        }
        Err(e) => {
            warn!(
                cert = %cert_path,
                key = %key_path,
                error = %e,
                "Configured certificate unusable, falling back to embedded certificate"
            );
            embedded_material(embedded)
        }
    }
}

fn load_files(cert_path: &str, key_path: &str, password: &str) -> AppResult<TlsMaterial> {
    if cert_path.is_empty() {
        return Err(AppError::TlsError("no certificate file configured".to_string()));
    }

    let cert = fs::read(cert_path)
        .map_err(|e| AppError::TlsError(format!("failed reading {cert_path}: {e}")))?;

    if is_pkcs12(cert_path) {
        return TlsMaterial::from_pkcs12(&cert, password);
    }

    let key = fs::read(key_path)
        .map_err(|e| AppError::TlsError(format!("failed reading {key_path}: {e}")))?;

    TlsMaterial::from_pem(
        PemPair {
            cert: &cert,
            key: &key,
        },
        MaterialSource::Pem,
    )
}

fn is_pkcs12(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pfx") || ext.eq_ignore_ascii_case("p12"))
}
