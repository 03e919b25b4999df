//! Logging module for Motion Sentry

use crate::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with tracing
///
/// Status lines go to stdout; a daily-rolling file under `config.log_dir`
/// keeps the same events with thread and target detail. Returns a guard
/// that must be kept alive for the duration of the program.
pub fn init_logging(config: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    // A missing log dir only loses the file layer output
    std::fs::create_dir_all(&config.log_dir).ok();

    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &config.log_dir,
        "motion-sentry.log",
    );

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .with_ansi(true)
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    guard
}
