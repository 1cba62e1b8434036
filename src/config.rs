//! Application configuration loaded from a YAML file.
//!
//! # Loading
//!
//! 1. A `.env` file is loaded into the process environment when present.
//! 2. The config file is read and `$VAR` / `${VAR}` references are expanded
//!    from the environment (unset variables expand to an empty string).
//! 3. The expanded text is parsed as YAML. Missing keys take defaults.
//! 4. CLI overrides (`--logLevel`, `--logDestination`, `--debug`) are applied.
//!
//! # Example
//!
//! ```yaml
//! logLevel: info
//! logDestination: stdout
//! apiKey: crypt:v1:...          # or plaintext
//! jwtSecret: ${JWT_SECRET}
//! jwtID: 6f0c2a40-example
//! webserver:
//!   listenHost: 0.0.0.0
//!   listenPort: 4443
//!   minTLS: "1.2"
//!   certFile: /opt/app/etc/cert.pem
//!   keyFile: /opt/app/etc/key.pem
//!   blockedIPs: 192.168.0.13,10.10.0.0/16
//!   allowedIPs:
//!     - 127.0.0.1
//!     - 10.0.0.0/8
//! ```
//!
//! # Environment
//!
//! `APP_ENV=dev` enables development mode: embedded certificate, swagger
//! routes and long-lived tokens. Anything else is production.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::crypt::EncryptedString;
use crate::error::{AppError, AppResult};
use crate::logging;
use crate::tls::MinTlsVersion;

/// Default config file path, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Environment variable selecting the application environment.
pub const APP_ENV_VAR: &str = "APP_ENV";

/// Application environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Dev,
    #[default]
    Prod,
}

impl Environment {
    /// Read the environment from `APP_ENV`.
    pub fn from_env() -> Self {
        std::env::var(APP_ENV_VAR)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("dev") {
            Environment::Dev
        } else {
            Environment::Prod
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Application environment, taken from `APP_ENV` rather than the file.
    #[serde(skip)]
    pub env: Environment,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Minimum log level: trace | debug | info | warning | error
    pub log_level: String,

    /// Log destination: stdout | stderr | null | /path/to/logfile
    pub log_destination: String,

    // =========================================================================
    // Credentials
    // =========================================================================
    /// Global API key (empty = API key authentication disabled)
    pub api_key: EncryptedString,

    /// Secret used to verify HS256 bearer tokens (empty = JWT disabled)
    pub jwt_secret: EncryptedString,

    /// Token id every accepted JWT must carry in its `jti` claim.
    /// Prevents a token issued for another app from being accepted here.
    #[serde(rename = "jwtID")]
    pub jwt_id: String,

    // =========================================================================
    // Observability / Browser access
    // =========================================================================
    /// Port for the Prometheus exporter (0 = disabled)
    pub metrics_port: u16,

    /// Allowed CORS origins; `*` allows any origin
    #[serde(deserialize_with = "string_list")]
    pub cors_allowed_origins: Vec<String>,

    /// Webserver settings
    pub webserver: WebserverConfig,
}

/// Webserver and TLS configuration (`webserver:` block).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebserverConfig {
    /// Host address the HTTPS server listens on
    pub listen_host: String,

    /// Port the HTTPS server listens on
    pub listen_port: u16,

    /// Minimum TLS version: "1.0" | "1.1" | "1.2" | "1.2a" | "" (TLS 1.3)
    #[serde(rename = "minTLS")]
    pub min_tls: String,

    /// PEM private key file (unused for PKCS12 bundles)
    pub key_file: String,

    /// PEM certificate chain, or a `.pfx`/`.p12` bundle
    pub cert_file: String,

    /// Password of the PKCS12 bundle
    pub cert_password: EncryptedString,

    /// Addresses or networks that are always rejected
    #[serde(rename = "blockedIPs", deserialize_with = "string_list")]
    pub blocked_ips: Vec<String>,

    /// Addresses or networks that are accepted; empty or "ALL" accepts all
    #[serde(rename = "allowedIPs", deserialize_with = "string_list")]
    pub allowed_ips: Vec<String>,
}

impl Default for WebserverConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 4443,
            min_tls: String::new(),
            key_file: String::new(),
            cert_file: String::new(),
            cert_password: EncryptedString::default(),
            blocked_ips: Vec::new(),
            allowed_ips: Vec::new(),
        }
    }
}

/// Default configuration for testing and development.
impl Default for Config {
    fn default() -> Self {
        Self {
            env: Environment::Prod,
            log_level: "info".to_string(),
            log_destination: "stdout".to_string(),
            api_key: EncryptedString::default(),
            jwt_secret: EncryptedString::default(),
            jwt_id: String::new(),
            metrics_port: 0,
            cors_allowed_origins: vec!["*".to_string()],
            webserver: WebserverConfig::default(),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_destination: Option<String>,
    pub debug: bool,
}

impl Config {
    /// Load, expand, parse and validate the config file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the file is missing or invalid and
    /// `AppError::YamlError` if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>, overrides: &ConfigOverrides) -> AppResult<Self> {
        // Load a .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::ConfigError(format!(
                "invalid or missing file {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path)?;
        let expanded = expand_env(&raw, |name| std::env::var(name).ok());

        let mut config = Self::from_yaml(&expanded)?;
        config.env = Environment::from_env();
        config.apply_overrides(overrides)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse already-expanded YAML text.
    pub fn from_yaml(text: &str) -> AppResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` for an unknown log level.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> AppResult<()> {
        if let Some(level) = overrides.log_level.as_deref().filter(|l| !l.is_empty()) {
            if logging::parse_level(level).is_none() {
                return Err(AppError::ConfigError(format!("invalid log level: {level}")));
            }
            self.log_level = level.to_string();
        }

        if overrides.debug {
            self.log_level = "debug".to_string();
        }

        if let Some(dest) = overrides
            .log_destination
            .as_deref()
            .filter(|d| !d.is_empty())
        {
            self.log_destination = dest.to_string();
        }

        Ok(())
    }

    /// Validate configuration values for consistency.
    pub fn validate(&self) -> AppResult<()> {
        if self.webserver.listen_host.trim().is_empty() {
            return Err(AppError::ConfigError(
                "webserver.listenHost must not be empty".to_string(),
            ));
        }

        if MinTlsVersion::parse(&self.webserver.min_tls).is_none() {
            warn!(
                min_tls = %self.webserver.min_tls,
                "Unsupported webserver.minTLS, using TLS 1.3"
            );
        }

        if !self.jwt_secret.is_empty() && self.jwt_id.trim().is_empty() {
            return Err(AppError::ConfigError(
                "jwtID is required when jwtSecret is set".to_string(),
            ));
        }

        Ok(())
    }

    /// Minimum TLS version; unrecognized values mean TLS 1.3.
    pub fn min_tls(&self) -> MinTlsVersion {
        MinTlsVersion::parse(&self.webserver.min_tls).unwrap_or_default()
    }

    /// Check if development mode is active.
    pub fn is_dev(&self) -> bool {
        self.env == Environment::Dev
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        let host = &self.webserver.listen_host;
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.webserver.listen_port)
        } else {
            format!("{host}:{}", self.webserver.listen_port)
        }
    }

    /// Check if API key authentication is enabled.
    pub fn api_key_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Check if bearer token authentication is enabled.
    pub fn jwt_enabled(&self) -> bool {
        !self.jwt_secret.is_empty() && !self.jwt_id.is_empty()
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        (self.metrics_port > 0).then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }
}

/// Expand `$NAME` and `${NAME}` references.
///
/// Unknown variables expand to an empty string. A `$` that does not start a
/// reference is kept as-is.
pub fn expand_env<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if closed {
                    out.push_str(&lookup(&name).unwrap_or_default());
                } else {
                    out.push_str("${");
                    out.push_str(&name);
                }
            }
            Some(n) if n.is_ascii_alphanumeric() || *n == '_' => {
                let mut name = String::new();
                while let Some(n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || *n == '_' {
                        name.push(*n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&lookup(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    out
}

/// Accept a YAML sequence, a comma-separated string, or null.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let raw = Option::<OneOrMany>::deserialize(deserializer)?;
    let items = match raw {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    };

    Ok(items
        .iter()
        .flat_map(|item| item.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.webserver.listen_host, "0.0.0.0");
        assert_eq!(config.webserver.listen_port, 4443);
        assert_eq!(config.log_level, "info");
        assert!(!config.api_key_enabled());
        assert!(!config.jwt_enabled());
        assert!(config.metrics_addr().is_none());
        assert!(!config.is_dev());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
logLevel: debug
logDestination: stderr
apiKey: my-api-key
jwtSecret: my-jwt-secret
jwtID: app-1
metricsPort: 9090
webserver:
  listenHost: 127.0.0.1
  listenPort: 8443
  minTLS: "1.2"
  certFile: /tmp/cert.pem
  keyFile: /tmp/key.pem
  certPassword: pfx-pass
  blockedIPs: 192.168.0.13, 10.10.0.0/16
  allowedIPs:
    - 127.0.0.1
    - 10.0.0.0/8,::1
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_destination, "stderr");
        assert_eq!(config.api_key.value(), "my-api-key");
        assert_eq!(config.jwt_secret.value(), "my-jwt-secret");
        assert_eq!(config.jwt_id, "app-1");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.webserver.listen_host, "127.0.0.1");
        assert_eq!(config.webserver.listen_port, 8443);
        assert_eq!(config.webserver.min_tls, "1.2");
        assert_eq!(config.webserver.cert_password.value(), "pfx-pass");
        assert_eq!(
            config.webserver.blocked_ips,
            vec!["192.168.0.13", "10.10.0.0/16"]
        );
        assert_eq!(
            config.webserver.allowed_ips,
            vec!["127.0.0.1", "10.0.0.0/8", "::1"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let config = Config::from_yaml("logLevel: warn\n").unwrap();
        assert_eq!(config.webserver.listen_port, 4443);
        assert_eq!(config.cors_allowed_origins, vec!["*"]);
        assert!(config.webserver.allowed_ips.is_empty());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_yaml("   \n").unwrap();
        assert_eq!(config.webserver.listen_port, 4443);
    }

    #[test]
    fn test_null_ip_list() {
        let config = Config::from_yaml("webserver:\n  blockedIPs:\n").unwrap();
        assert!(config.webserver.blocked_ips.is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let result = Config::from_yaml("webserver: [unclosed");
        assert!(matches!(result, Err(AppError::YamlError(_))));
    }

    #[test]
    fn test_expand_env_braced_and_bare() {
        let lookup = |name: &str| match name {
            "HOST" => Some("10.0.0.1".to_string()),
            "PORT" => Some("8443".to_string()),
            _ => None,
        };

        assert_eq!(
            expand_env("listen: ${HOST}:$PORT", lookup),
            "listen: 10.0.0.1:8443"
        );
    }

    #[test]
    fn test_expand_env_unknown_is_empty() {
        assert_eq!(expand_env("key: ${MISSING}x", |_| None), "key: x");
        assert_eq!(expand_env("key: $MISSING", |_| None), "key: ");
    }

    #[test]
    fn test_expand_env_literal_dollar() {
        assert_eq!(expand_env("price: 5$ ${", |_| None), "price: 5$ ${");
    }

    #[test]
    fn test_override_log_level() {
        let mut config = Config::default();
        let overrides = ConfigOverrides {
            log_level: Some("warning".to_string()),
            log_destination: Some("/tmp/app.log".to_string()),
            debug: false,
        };

        config.apply_overrides(&overrides).unwrap();
        assert_eq!(config.log_level, "warning");
        assert_eq!(config.log_destination, "/tmp/app.log");
    }

    #[test]
    fn test_override_invalid_log_level() {
        let mut config = Config::default();
        let overrides = ConfigOverrides {
            log_level: Some("loud".to_string()),
            ..ConfigOverrides::default()
        };

        let result = config.apply_overrides(&overrides);
        assert!(result.unwrap_err().to_string().contains("invalid log level"));
    }

    #[test]
    fn test_debug_flag_sets_debug_level() {
        let mut config = Config::default();
        let overrides = ConfigOverrides {
            debug: true,
            ..ConfigOverrides::default()
        };

        config.apply_overrides(&overrides).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_unknown_min_tls_falls_back_to_tls13() {
        let mut config = Config::default();
        config.webserver.min_tls = "1.4".to_string();

        assert!(config.validate().is_ok());
        assert_eq!(config.min_tls(), MinTlsVersion::Tls13);

        config.webserver.min_tls = "1.2a".to_string();
        assert_eq!(config.min_tls(), MinTlsVersion::Tls12Any);
    }

    #[test]
    fn test_validate_jwt_secret_requires_id() {
        let config = Config {
            jwt_secret: EncryptedString::new("secret"),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("jwtID"));
    }

    #[test]
    fn test_server_addr_format() {
        let mut config = Config::default();
        config.webserver.listen_host = "localhost".to_string();
        config.webserver.listen_port = 3000;
        assert_eq!(config.server_addr(), "localhost:3000");

        config.webserver.listen_host = "::1".to_string();
        assert_eq!(config.server_addr(), "[::1]:3000");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/config.yaml", &ConfigOverrides::default());
        assert!(result.unwrap_err().to_string().contains("invalid or missing file"));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("dev"), Environment::Dev);
        assert_eq!(Environment::parse(" DEV "), Environment::Dev);
        assert_eq!(Environment::parse("prod"), Environment::Prod);
        assert_eq!(Environment::parse("staging"), Environment::Prod);
    }
}
