//! Tracing setup for the shim binary and embedders.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::errors::{ShimError, ShimResult};

/// Log file prefix inside the logs directory; the appender adds the date.
const LOG_FILE_PREFIX: &str = "podshim.log";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Output always goes to stderr; with
/// `log_dir` set it is also written to a daily rolling file there.
///
/// Keep the returned guard alive for the life of the process, dropping it
/// flushes the file writer.
///
/// # Errors
///
/// Returns error if `log_dir` cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(
    default_filter: &str,
    log_dir: Option<&Path>,
) -> ShimResult<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).boxed();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ShimError::Internal(format!("Failed to install tracing subscriber: {}", e)))?;

    Ok(guard)
}
