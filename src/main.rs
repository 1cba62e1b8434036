use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::{debug, error, info, warn};

use api_skeleton::cli::{Cli, about_yaml};
use api_skeleton::crypt::EncryptedString;
use api_skeleton::{Completion, Config, Coordinator, OsSignals, logging};

/// Exit status for configuration and runtime failures.
const EXIT_FAILURE: exitcode::ExitCode = 1;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Ok(()),
                _ => Err(EXIT_FAILURE),
            };
        }
    };

    if cli.about {
        let yaml = about_yaml().map_err(|e| {
            eprintln!("error: {e}");
            EXIT_FAILURE
        })?;
        print!("{yaml}");
        return Ok(());
    }

    if let Some(plain) = &cli.crypt {
        let encrypted = EncryptedString::new(plain.as_str())
            .encrypted_value()
            .map_err(|e| {
                eprintln!("error: {e}");
                EXIT_FAILURE
            })?;
        println!("{encrypted}");
        return Ok(());
    }

    if cli.version {
        println!("{}", api_skeleton::VERSION);
        return Ok(());
    }

    let overrides = cli.overrides();
    let mut config = Config::load(&cli.config, &overrides).map_err(|e| {
        eprintln!("Failed to load config file {}: {e}", cli.config);
        EXIT_FAILURE
    })?;

    let log = logging::init(&config.log_level, &config.log_destination).map_err(|e| {
        eprintln!("Failed to initialize logger: {e}");
        EXIT_FAILURE
    })?;

    info!(
        "Starting {} v{}",
        api_skeleton::APP_NAME,
        api_skeleton::VERSION
    );

    let mut coordinator = Coordinator::new();

    loop {
        info!(log_level = %config.log_level, "Logging initialized");
        debug!(config = ?config, "Starting with configuration");

        let signals = OsSignals::register().map_err(|e| {
            error!(error = %e, "Critical error occurred, shutting down");
            EXIT_FAILURE
        })?;

        let running = coordinator.start(config, signals).await.map_err(|e| {
            error!(error = %e, "Critical error occurred, shutting down");
            EXIT_FAILURE
        })?;

        match running.completion().await {
            Completion::Restart => {
                info!(config_file = %cli.config, "Reload configuration");
                config = Config::load(&cli.config, &overrides).map_err(|e| {
                    error!(
                        config_file = %cli.config,
                        error = %e,
                        "Failed to reload config file, shutting down"
                    );
                    EXIT_FAILURE
                })?;

                if let Err(e) = log.apply(&config.log_level, &config.log_destination) {
                    warn!(error = %e, "Keeping previous log settings");
                }
            }
            Completion::Shutdown => {
                info!("Server shutdown complete");
                return Ok(());
            }
            Completion::Failed(reason) => {
                error!(reason = %reason, "Server failed, shutting down");
                return Err(EXIT_FAILURE);
            }
        }
    }
}
