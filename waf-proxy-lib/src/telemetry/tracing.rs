use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::config::{LoggingConfig, TelemetryConfig};

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides both the configured level and the OpenTelemetry level.
/// With `logging.log_file` set, output is appended to that file without ANSI
/// colors; otherwise it goes to stdout.
pub fn init_tracing(
    logging: &LoggingConfig,
    telemetry: &TelemetryConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "{},opentelemetry={}",
            logging.level, telemetry.otel_log_level
        ))
    });

    let file = match &logging.log_file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file {}: {e}", path.display()))?,
        ),
        None => None,
    };

    let stdout_layer = file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_target(logging.show_target));
    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_target(logging.show_target)
            .with_ansi(false)
            .with_writer(Mutex::new(f))
    });

    let subscriber = Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set global tracing subscriber: {e}"))?;

    Ok(())
}
