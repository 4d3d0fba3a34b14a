use tracing_subscriber::{fmt::time::UtcTime, layer::Identity, prelude::*};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize logging: console plus an optional rolling file appender.
///
/// Filter precedence: config level > `RUST_LOG` > "info".
pub fn init_with_config(cfg: &LoggingConfig) {
    let env_filter = if let Some(level) = &cfg.level {
        tracing_subscriber::EnvFilter::new(level.as_str())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match cfg.format {
        LogFormat::Json => {
            let registry = tracing_subscriber::registry().with(env_filter).with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(std::io::stdout),
            );
            if let Some(writer) = file_writer(cfg) {
                let _ = registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_ansi(false)
                            .with_timer(UtcTime::rfc_3339())
                            .with_writer(writer),
                    )
                    .try_init();
            } else {
                let _ = registry.with(Identity::new()).try_init();
            }
        }
        LogFormat::Text => {
            let registry = tracing_subscriber::registry().with(env_filter).with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(std::io::stdout),
            );
            if let Some(writer) = file_writer(cfg) {
                let _ = registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_timer(UtcTime::rfc_3339())
                            .with_writer(writer),
                    )
                    .try_init();
            } else {
                let _ = registry.with(Identity::new()).try_init();
            }
        }
    }
}

fn file_writer(cfg: &LoggingConfig) -> Option<tracing_appender::non_blocking::NonBlocking> {
    if !cfg.enable_file_logging {
        return None;
    }

    let rotation = match cfg.rotation.to_lowercase().as_str() {
        "hourly" => tracing_appender::rolling::Rotation::HOURLY,
        "never" => tracing_appender::rolling::Rotation::NEVER,
        _ => tracing_appender::rolling::Rotation::DAILY,
    };

    if std::fs::create_dir_all(&cfg.dir).is_err() {
        eprintln!(
            "Failed to create log directory '{}', continuing with stdout logs",
            cfg.dir
        );
        return None;
    }

    let file_appender =
        tracing_appender::rolling::RollingFileAppender::new(rotation, &cfg.dir, &cfg.filename);
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    // Keep guard alive for process lifetime
    let _leaked: &'static _ = Box::leak(Box::new(file_guard));

    Some(non_blocking)
}
