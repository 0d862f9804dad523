use anyhow::{Context, Result};
use std::env::var;
use tracing::subscriber::set_global_default;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_forest::ForestLayer;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Compose the layers of the `tracing` subscriber and register it as the
/// global default. `log` records emitted by dependencies are forwarded too.
///
/// It should only be called once! The returned guard flushes the log file
/// when dropped, keep it alive for the lifetime of the program.
pub fn init_subscriber(
    name: &str,
    default_filter: &str,
) -> Result<WorkerGuard> {
    // Env variable LOG_CONFIG_PATH points at the path where
    // LOG_CONFIG_FILENAME is located
    let log_config_path =
        var("LOG_CONFIG_PATH").unwrap_or_else(|_| "./".to_string());
    // Env variable LOG_CONFIG_FILENAME names the log file
    let log_config_filename = var("LOG_CONFIG_FILENAME")
        .unwrap_or_else(|_| format!("{}.log", name));

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_appender =
        tracing_appender::rolling::never(log_config_path, log_config_filename);
    let (non_blocking_file, guard) =
        tracing_appender::non_blocking(file_appender);

    let layers = vec![
        env_filter.boxed(),
        fmt::Layer::default()
            .with_ansi(false)
            .with_writer(non_blocking_file)
            .boxed(),
        ForestLayer::default().boxed(),
    ];

    let subscriber = Registry::default().with(layers);

    LogTracer::init().context("Failed to set logger")?;
    set_global_default(subscriber).context("Failed to set subscriber")?;

    Ok(guard)
}
