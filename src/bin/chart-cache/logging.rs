//! Subscriber setup for the CLI.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal};

use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use chart_cache::config::{LogFormat, LoggingConfig};

/// Errors that can occur during logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("failed to open log file '{0}': {1}")]
    FileOpen(String, #[source] io::Error),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber described by `config`.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;
    let (writer, ansi) = writer(&config.output)?;
    let ansi = ansi && config.color;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format, config.timestamps) {
        (LogFormat::Text, true) => fmt::layer()
            .with_ansi(ansi)
            .with_target(config.target)
            .with_span_events(FmtSpan::NONE)
            .with_writer(writer)
            .boxed(),
        (LogFormat::Text, false) => fmt::layer()
            .with_ansi(ansi)
            .with_target(config.target)
            .with_span_events(FmtSpan::NONE)
            .with_writer(writer)
            .without_time()
            .boxed(),
        (LogFormat::Json, true) => fmt::layer()
            .json()
            .with_target(config.target)
            .with_span_events(FmtSpan::NONE)
            .with_writer(writer)
            .boxed(),
        (LogFormat::Json, false) => fmt::layer()
            .json()
            .with_target(config.target)
            .with_span_events(FmtSpan::NONE)
            .with_writer(writer)
            .without_time()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

/// Writer for `stdout`, `stderr` or an append-mode file, and whether ANSI
/// colors make sense on it.
fn writer(output: &str) -> Result<(BoxMakeWriter, bool), LoggingError> {
    match output {
        "stdout" => Ok((BoxMakeWriter::new(io::stdout), io::stdout().is_terminal())),
        "stderr" => Ok((BoxMakeWriter::new(io::stderr), io::stderr().is_terminal())),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::FileOpen(path.to_string(), e))?;
            Ok((BoxMakeWriter::new(file), false))
        }
    }
}
