//! Log subscriber setup with reloadable level and destination.
//!
//! The subscriber is installed once per process. A restart reloads the config
//! and calls [`LogHandle::apply`], which swaps the level filter through a
//! `tracing_subscriber::reload` handle and redirects the shared sink in place.
//!
//! `RUST_LOG`, when set, takes precedence over the configured level.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::error::{AppError, AppResult};

/// Parse a configured log level name.
///
/// Accepts `trace`, `debug`, `info`, `warning`/`warn` and `error`/`err`,
/// case-insensitively.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warning" | "warn" => Some(LevelFilter::WARN),
        "error" | "err" => Some(LevelFilter::ERROR),
        _ => None,
    }
}

/// Where log lines are written.
#[derive(Debug)]
enum Destination {
    Stdout,
    Stderr,
    Null,
    File(File),
}

impl Destination {
    fn open(destination: &str) -> AppResult<Self> {
        match destination.trim() {
            "" | "stdout" => Ok(Destination::Stdout),
            "stderr" => Ok(Destination::Stderr),
            "null" => Ok(Destination::Null),
            path => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(Destination::File)
                .map_err(|e| {
                    AppError::ConfigError(format!("cannot open log destination {path}: {e}"))
                }),
        }
    }
}

/// Shared, swappable log sink used as the fmt layer's writer.
#[derive(Clone, Debug)]
pub struct LogSink {
    dest: Arc<Mutex<Destination>>,
}

impl LogSink {
    fn new(dest: Destination) -> Self {
        Self {
            dest: Arc::new(Mutex::new(dest)),
        }
    }

    fn redirect(&self, dest: Destination) {
        let mut guard = self.dest.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = dest;
    }
}

/// Writer handed out per log event.
pub struct SinkWriter {
    dest: Arc<Mutex<Destination>>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.dest.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *guard {
            Destination::Stdout => io::stdout().write(buf),
            Destination::Stderr => io::stderr().write(buf),
            Destination::Null => Ok(buf.len()),
            Destination::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.dest.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *guard {
            Destination::Stdout => io::stdout().flush(),
            Destination::Stderr => io::stderr().flush(),
            Destination::Null => Ok(()),
            Destination::File(file) => file.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            dest: Arc::clone(&self.dest),
        }
    }
}

/// Handle for reconfiguring the installed subscriber.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    sink: LogSink,
}

impl LogHandle {
    /// Switch level and destination to new values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the destination cannot be opened.
    /// The previous settings stay active in that case.
    pub fn apply(&self, level: &str, destination: &str) -> AppResult<()> {
        let dest = Destination::open(destination)?;
        self.sink.redirect(dest);

        if let Err(e) = self.filter.reload(build_filter(level)) {
            // Subscriber is gone; nothing left to reconfigure.
            eprintln!("failed to reload log filter: {e}");
        }
        warn_unknown_level(level);
        Ok(())
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `AppError::ConfigError` if the destination cannot be opened or a
/// global subscriber is already installed.
pub fn init(level: &str, destination: &str) -> AppResult<LogHandle> {
    let sink = LogSink::new(Destination::open(destination)?);
    let (filter, handle) = reload::Layer::new(build_filter(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(sink.clone())
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init()
        .map_err(|e| AppError::ConfigError(format!("log subscriber already installed: {e}")))?;

    warn_unknown_level(level);
    Ok(LogHandle {
        filter: handle,
        sink,
    })
}

fn build_filter(level: &str) -> EnvFilter {
    let level = parse_level(level).unwrap_or(LevelFilter::INFO);
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

fn warn_unknown_level(level: &str) {
    if parse_level(level).is_none() {
        tracing::warn!(level = %level, "Unknown log level, using info");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("trace"), Some(LevelFilter::TRACE));
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("info"), Some(LevelFilter::INFO));
        assert_eq!(parse_level("warning"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("warn"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("err"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("verbose"), None);
        assert_eq!(parse_level(""), None);
    }

    #[test]
    fn test_destination_keywords() {
        assert!(matches!(Destination::open("stdout"), Ok(Destination::Stdout)));
        assert!(matches!(Destination::open(""), Ok(Destination::Stdout)));
        assert!(matches!(Destination::open("stderr"), Ok(Destination::Stderr)));
        assert!(matches!(Destination::open("null"), Ok(Destination::Null)));
    }

    #[test]
    fn test_unopenable_destination() {
        let result = Destination::open("/nonexistent-dir/sub/app.log");
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_sink_redirects_to_file() {
        let path = std::env::temp_dir().join(format!("api-skeleton-{}.log", uuid::Uuid::new_v4()));
        let sink = LogSink::new(Destination::Null);

        sink.make_writer().write_all(b"dropped\n").unwrap();

        sink.redirect(Destination::open(path.to_str().unwrap()).unwrap());
        let mut writer = sink.make_writer();
        writer.write_all(b"kept\n").unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "kept\n");
        std::fs::remove_file(&path).ok();
    }
}
