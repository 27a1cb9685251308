use std::io;
use std::sync::Once;

use config::environment::Environment;
use thiserror::Error;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::log::SetLoggerError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine the runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Guard flushing buffered log lines when dropped.
///
/// Hold it until the process exits, otherwise the last lines can be lost.
#[must_use]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for a binary.
///
/// Lines are written to stdout through a non-blocking writer. The dev environment
/// produces human readable output while prod emits JSON objects, one per line.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load().map_err(TracingError::Environment)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (writer, guard) = tracing_appender::non_blocking(io::stdout());

    tracing_log::LogTracer::init()?;

    let registry = tracing_subscriber::registry().with(filter);
    if environment.is_prod() {
        let layer = fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(writer);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    } else {
        let layer = fmt::layer().with_writer(writer);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    }

    info!(app = app_name, %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process.
///
/// Output is only produced when `RUST_LOG` is set, so test runs stay quiet by default.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("RUST_LOG").is_err() {
            return;
        }

        let _ = tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
