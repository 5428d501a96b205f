use crate::config::AppConfig;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global tracing subscriber.
///
/// Logs always go to a daily rolling file under `logs/`; stdout is added when
/// `LOG_TO_STDOUT=true`. The returned guard flushes the file writer and must be
/// held until the process exits.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    std::fs::create_dir_all("logs").ok();

    let file_appender = rolling::daily("logs", &config.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = config.log_to_stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
            .with_thread_ids(true)
    });

    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    tracing::info!(
        project = %config.project_name,
        env = %config.env,
        level = %config.log_level,
        "logging initialised"
    );
    guard
}
