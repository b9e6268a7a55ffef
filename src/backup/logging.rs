use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use std::path::Path;

pub const LOG_NAME: &str = "autobackup.log";

/// Console output plus `<log_dirpath>/autobackup.log`.
///
/// The console shows INFO and above (DEBUG with `debug`), with warnings and
/// errors on stderr; `RUST_LOG` takes precedence when set. The file always
/// receives DEBUG and above. Keep the returned guard alive until exit or
/// buffered lines are lost.
pub fn init_logging<P: AsRef<Path>>(log_dirpath: P, debug: bool) -> WorkerGuard {
    let default_level = if debug { "debug" } else { "info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_appender = tracing_appender::rolling::never(log_dirpath, LOG_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout))
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug")),
        )
        .init();

    guard
}

/// Subscriber for reporting problems before the configuration is known.
pub fn early_subscriber() -> impl tracing::Subscriber + Send + Sync {
    fmt().with_writer(std::io::stderr).with_target(false).finish()
}
