use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Install the global subscriber described by `cfg`.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let registry = tracing_subscriber::registry().with(directive_filter(&cfg.level)?);
    match cfg.format {
        LoggerFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_timer(local_timer()),
            )
            .try_init(),
        LoggerFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(cfg.with_targets)
                    .with_timer(local_timer()),
            )
            .try_init(),
        LoggerFormat::Journald => registry.with(journald_layer()?).try_init(),
    }
    .map_err(LoggerError::from_init)
}

fn directive_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|e| LoggerError::InvalidLogLevel {
        directive: level.to_string(),
        reason: e.to_string(),
    })
}

/// Local-time RFC 3339 stamps, UTC when the offset cannot be determined.
fn local_timer() -> OffsetTime<Rfc3339> {
    OffsetTime::new(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC), Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_layer() -> Result<tracing_journald::Layer, LoggerError> {
    tracing_journald::layer()
        .map(|layer| layer.with_syslog_identifier("rotor".to_string()))
        .map_err(|e| LoggerError::InitializationFailed(format!("journald socket: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_layer() -> Result<tracing_subscriber::layer::Identity, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
