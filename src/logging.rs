//! Tracing subscriber setup for binaries
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. [`init`] is the setup used by the `serialscope`
//! binary: a compact stderr layer filtered by `RUST_LOG` (or the given
//! default), plus an optional daily-rolling log file written off-thread.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,serialscope=debug";

/// File name prefix for rolling log files
pub const LOG_FILE_PREFIX: &str = "serialscope.log";

/// Install the global subscriber
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes and stops the file writer. Returns `None` when no log directory
/// was given. Installing twice logs a warning and keeps the first
/// subscriber.
pub fn init(default_filter: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .try_init();

    if let Err(e) = installed {
        tracing::warn!("Logging already initialised: {}", e);
    }
    guard
}
