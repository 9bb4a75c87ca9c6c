//! Logging setup
//!
//! `RUST_LOG` overrides the default filter in both modes.

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "context_gatekeeper=info";

/// File name prefix for rolling log files
pub const LOG_FILE_PREFIX: &str = "gatekeeper.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Human-readable logs on stderr
pub fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

/// JSON lines written to a daily rolling file in `dir`
///
/// Returns the writer guard; keep it alive for as long as logs should be
/// flushed.
pub fn json_file_layer<S>(dir: impl AsRef<Path>) -> (impl Layer<S>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(dir.as_ref(), LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(writer);
    (layer, guard)
}

/// Stderr logs plus JSON lines in a daily rolling file
pub fn init_file_logging(dir: impl AsRef<Path>) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir.as_ref())?;
    let (file_layer, guard) = json_file_layer::<Registry>(dir);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    Ok(guard)
}
