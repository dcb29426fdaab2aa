use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

fn log_format() -> LogFormat {
    match std::env::var("AXIS_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

/// Install the global subscriber. Filtering follows `RUST_LOG` (default
/// `info`); `AXIS_LOG_FORMAT=json` switches console output to JSON lines and
/// `AXIS_LOG_DIR` adds a daily-rolled file sink.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = match log_format() {
        LogFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
        LogFormat::Pretty => fmt::layer().with_filter(filter).boxed(),
    };
    let registry = tracing_subscriber::registry().with(console);

    match std::env::var("AXIS_LOG_DIR").ok().filter(|d| !d.trim().is_empty()) {
        Some(dir) => {
            if std::fs::create_dir_all(&dir).is_err() {
                eprintln!("failed to create log directory {dir}");
            }
            let writer = tracing_appender::rolling::daily(&dir, "axis");
            let (nb, guard) = tracing_appender::non_blocking(writer);
            let _ = FILE_GUARD.set(guard);
            let file_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            let file_layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(nb)
                .with_filter(file_filter);
            let _ = registry.with(file_layer).try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
}
