//! Tracing subscriber setup

use crate::{
    config::{LogFormat, LoggerConfig},
    Error, Result,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Handle on the logging sink. Holding it keeps the file writer alive;
/// [`LogSink::close`] flushes and releases it.
#[derive(Debug, Default)]
pub struct LogSink {
    guard: Option<WorkerGuard>,
}

impl LogSink {
    /// Whether a file writer is attached
    pub fn has_file(&self) -> bool {
        self.guard.is_some()
    }

    /// Flush buffered lines and stop the writer thread
    pub fn close(mut self) -> Result<()> {
        if let Some(guard) = self.guard.take() {
            tracing::info!("Closing log file sink");
            drop(guard);
        }
        Ok(())
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `config.level`.
pub fn init_logging(config: &LoggerConfig) -> Result<LogSink> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    match config.format {
        LogFormat::Json => layers.push(fmt::layer().json().with_target(true).boxed()),
        LogFormat::Pretty => layers.push(fmt::layer().with_target(false).boxed()),
    }

    let guard = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("logger already initialized: {}", e)))?;

    Ok(LogSink { guard })
}
