//! Logging and tracing initialization.

use crate::config::LoggingConfig;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Target used for timing summaries that should survive in log files.
pub const PERSIST_TARGET: &str = "deid::persist";

/// Initialize the tracing subscriber with the given configuration.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let (writer, to_file) = log_writer(config.file.as_deref());

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(true)
        .with_ansi(!to_file);
    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish()).ok();
    } else {
        tracing::subscriber::set_global_default(builder.finish()).ok();
    }
}

/// Writer for log output: the configured file in append mode, or stdout.
///
/// Returns whether the file is in use. An unopenable file falls back to
/// stdout with a notice on stderr.
fn log_writer(file: Option<&Path>) -> (BoxMakeWriter, bool) {
    let Some(path) = file else {
        return (BoxMakeWriter::new(std::io::stdout), false);
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), true),
        Err(e) => {
            eprintln!("deid: cannot open log file {}: {e}", path.display());
            (BoxMakeWriter::new(std::io::stdout), false)
        }
    }
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() {
    init_logging(&LoggingConfig::default());
}
