//! Logging Infrastructure
//!
//! stdout 输出 + 可选的按天滚动日志文件。`RUST_LOG` 优先于配置的级别。

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(format!("{level},hyper=warn,reqwest=warn,tungstenite=warn"))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Initialize the logger with default settings
pub fn init_logger() -> Option<WorkerGuard> {
    init_logger_with_file(None, false, None)
}

/// Initialize the logger with optional file output
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the lifetime of the process. Calling this twice is harmless: the
/// second subscriber is not installed.
pub fn init_logger_with_file(
    log_level: Option<&str>,
    json: bool,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let level = log_level.unwrap_or("info");

    let stdout_layer = if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stdout)
            .boxed()
    } else {
        fmt::layer()
            .with_timer(LocalTimer)
            .with_target(false)
            .with_writer(std::io::stdout)
            .boxed()
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = rolling::daily(dir, "qrdine.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_timer(LocalTimer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(writer)
                    .boxed();
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
                (None, None)
            }
        },
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %level, file = log_dir.is_some(), "Logger initialized");
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = init_logger_with_file(Some("debug"), false, Some(dir.path()));
        assert!(guard.is_some());
        // 第二次不会 panic
        let _ = init_logger();
        tracing::info!("written to file");
    }
}
