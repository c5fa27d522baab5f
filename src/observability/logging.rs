//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Fan log events out to every configured sink (console, JSON file)
//!
//! # Design Decisions
//! - Each sink is an independent layer with its own filter; the registry
//!   forwards every event to all of them in turn
//! - `RUST_LOG` overrides the configured level
//! - Console is text or JSON; the file sink is always JSON

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{LogFormat, LoggingConfig};

/// Name of the JSON log file inside the configured directory.
pub const LOG_FILE_NAME: &str = "relay.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: InitError,
    },

    #[error("install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Sink layers plus the guard flushing the file writer's background thread.
/// Buffered file output is lost if the guard is dropped early.
pub struct LogLayers {
    pub layers: Vec<BoxedLayer>,
    pub guard: Option<WorkerGuard>,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stream_relay={level},tower_http={level}")))
}

fn file_layer(directory: &Path, level: &str) -> Result<(BoxedLayer, WorkerGuard), LoggingError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(directory)
        .map_err(|source| LoggingError::File {
            path: directory.join(LOG_FILE_NAME),
            source,
        })?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(env_filter(level))
        .boxed();
    Ok((layer, guard))
}

/// Build the sink layers for `config` without installing them.
pub fn layers(config: &LoggingConfig) -> Result<LogLayers, LoggingError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_filter(env_filter(&config.level))
            .boxed(),
        LogFormat::Text => fmt::layer().with_filter(env_filter(&config.level)).boxed(),
    };
    layers.push(console);

    let mut guard = None;
    if let Some(directory) = &config.directory {
        let (layer, file_guard) = file_layer(Path::new(directory), &config.level)?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    Ok(LogLayers { layers, guard })
}

/// Install the global subscriber. Hold the returned guard until exit.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let LogLayers { layers, guard } = layers(config)?;
    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(guard)
}
