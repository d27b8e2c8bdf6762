//! Logging configuration.
//!
//! Events go to stderr, and additionally to a daily rolling file when a log
//! directory is given.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the logging system.
///
/// Log level can be controlled via the `OODVIZ_LOG` environment variable:
/// - `OODVIZ_LOG=debug` for per-sample progress
/// - `OODVIZ_LOG=info` for stage summaries (default)
/// - `OODVIZ_LOG=warn` for warnings and errors only
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("OODVIZ_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let file_layer = match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;
            let file_appender = tracing_appender::rolling::daily(&log_dir, "oodviz.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Dropping the guard stops the writer thread; keep it for the process.
            let _ = GUARD.set(guard);
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!("Logging initialized");
    Ok(())
}
