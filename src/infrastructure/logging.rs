//! Tracing subscriber setup: env-filtered console output, optional JSON
//! format, optional daily-rotated file output.

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::config::LoggingConfig;

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Installs the global subscriber. Safe to call more than once; only the
/// first call wins. `RUST_LOG` overrides the configured filter.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    let file_layer = config.file_dir.as_ref().map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, "price-scout.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().with_writer(writer).with_ansi(false)
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialized, keeping existing subscriber");
    }
}
