//! Command-line interface.

use clap::Parser;
use serde::Serialize;

use crate::config::{ConfigOverrides, DEFAULT_CONFIG_FILE};
use crate::error::AppResult;

/// HTTPS API service skeleton.
#[derive(Debug, Parser)]
#[command(name = "api_skeleton", disable_version_flag = true)]
pub struct Cli {
    /// Print app details and exit
    #[arg(long)]
    pub about: bool,

    /// Encrypt the given string for use in the config file and exit
    #[arg(long, value_name = "PLAINTEXT")]
    pub crypt: Option<String>,

    /// Print the app version and exit
    #[arg(long)]
    pub version: bool,

    /// Path to the config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Enable debug logging (overrides the config file)
    #[arg(long)]
    pub debug: bool,

    /// Log level: trace | debug | info | warning | error (overrides the config file)
    #[arg(long = "logLevel", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log destination: stdout | stderr | null | /path/to/logfile (overrides the config file)
    #[arg(long = "logDestination", value_name = "DEST")]
    pub log_destination: Option<String>,
}

impl Cli {
    /// Config values given on the command line.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            log_destination: self.log_destination.clone(),
            debug: self.debug,
        }
    }
}

/// Program details printed by `--about`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct About {
    author: &'static str,
    binary: String,
    comment: &'static str,
    desc: &'static str,
    help: String,
    prog_lang: String,
    repo: &'static str,
    version: &'static str,
}

/// Render the `--about` output as YAML.
pub fn about_yaml() -> AppResult<String> {
    let binary = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| crate::APP_NAME.to_string());

    let about = About {
        author: env!("CARGO_PKG_AUTHORS"),
        help: format!("{binary} --help"),
        binary,
        comment: "environment overrides in .env, config file given by --config",
        desc: env!("CARGO_PKG_DESCRIPTION"),
        prog_lang: format!("Rust ({}-{})", std::env::consts::ARCH, std::env::consts::OS),
        repo: env!("CARGO_PKG_REPOSITORY"),
        version: crate::VERSION,
    };

    Ok(serde_yaml::to_string(&about)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["api_skeleton"]).unwrap();
        assert_eq!(cli.config, "config.yaml");
        assert!(!cli.about && !cli.version && !cli.debug);
        assert!(cli.crypt.is_none());
    }

    #[test]
    fn test_camel_case_log_flags() {
        let cli = Cli::try_parse_from([
            "api_skeleton",
            "--logLevel",
            "warning",
            "--logDestination",
            "/var/log/app.log",
            "--config",
            "/opt/app/etc/config.yaml",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.log_level.as_deref(), Some("warning"));
        assert_eq!(overrides.log_destination.as_deref(), Some("/var/log/app.log"));
        assert_eq!(cli.config, "/opt/app/etc/config.yaml");
    }

    #[test]
    fn test_crypt_flag() {
        let cli = Cli::try_parse_from(["api_skeleton", "--crypt", "hunter2"]).unwrap();
        assert_eq!(cli.crypt.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_unknown_flag_is_error() {
        assert!(Cli::try_parse_from(["api_skeleton", "--bogus"]).is_err());
    }

    #[test]
    fn test_about_yaml_has_version() {
        let yaml = about_yaml().unwrap();
        assert!(yaml.contains(&format!("version: {}", crate::VERSION)));
        assert!(yaml.contains("progLang:"));
    }
}
