// Logging module
// Console and rolling-file output built on the tracing crate
//
// Numeric verbosity levels from the command line are mapped onto tracing
// filter strings; RUST_LOG always wins when it is set.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracing_appender::rolling;
use std::path::Path;

/// Default file name used when a log directory is configured
pub const DEFAULT_LOG_FILE: &str = "macroblock-converter.log";

/// Map a numeric verbosity (0=Minimum, 1=Error, 2=Detail, 3=Full/Debug, 4=Trace)
/// onto a tracing filter string
pub fn map_log_level(level: i32) -> &'static str {
    match level {
        i32::MIN..=0 => "warn",
        1 => "error",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system
/// Console output is always enabled; a daily rolling file is added when `log_dir` is set
pub fn initialize_logging(log_dir: Option<&str>, log_level: &str, file_name: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if let Some(dir) = log_dir {
        let path = Path::new(dir);
        if !path.exists() {
            let _ = std::fs::create_dir_all(path);
        }

        let file_appender = rolling::daily(dir, file_name.unwrap_or(DEFAULT_LOG_FILE));
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

        // Keep the guard alive by leaking it (it lives for the program duration)
        std::mem::forget(_guard);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init();
    }
}

/// Convenience macros mapping the converter's verbosity tiers onto tracing levels

#[macro_export]
macro_rules! basic_log {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[macro_export]
macro_rules! detail_log {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) };
}

#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => { tracing::error!($($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_log_level() {
        assert_eq!(map_log_level(-3), "warn");
        assert_eq!(map_log_level(0), "warn");
        assert_eq!(map_log_level(1), "error");
        assert_eq!(map_log_level(2), "info");
        assert_eq!(map_log_level(3), "debug");
        assert_eq!(map_log_level(7), "trace");
    }
}
