//! Logging initialization.
//!
//! Console logging is filtered through `RUST_LOG` with a quiet default;
//! an optional log file captures everything at debug level for protocol
//! troubleshooting. The returned guard must be held for the lifetime of
//! the process or buffered file output is lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialize console logging.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(filter))
        .init();
}

/// Initialize console logging plus a debug-level log file.
pub fn init_with_file(log_path: &Path) -> std::io::Result<WorkerGuard> {
    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let file = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "retromap.log".to_string());

    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(console_filter))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug")),
        )
        .init();
    Ok(guard)
}
