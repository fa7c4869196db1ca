//! Tracing subscriber setup. `log` records from the library are bridged in.

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use mailminder::config::{LogFormat, LoggingConfig};

/// `RUST_LOG` wins over the configured level; an unusable level falls back to `info`.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("failed to install log bridge")?;

    let registry = Registry::default().with(env_filter(&config.level));
    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_ansi(false)))
        }
    }
    .context("failed to install tracing subscriber")
}
