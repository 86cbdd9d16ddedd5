use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::dispatcher::SetGlobalDefaultError;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Build the filtered output layer for `cfg` and install it as the global default.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let layer = output_layer(cfg)?;
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| match std::error::Error::source(&e) {
            Some(inner) if inner.is::<SetGlobalDefaultError>() => LoggerError::AlreadyInitialized,
            _ => LoggerError::InitializationFailed(e.to_string()),
        })
}

pub(crate) fn output_layer(cfg: &LoggerConfig) -> Result<BoxedLayer, LoggerError> {
    let filter = env_filter(&cfg.level)?;

    let layer = match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(local_timer())
            .with_filter(filter)
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_current_span(true)
            .with_timer(local_timer())
            .with_filter(filter)
            .boxed(),
        LoggerFormat::Journald => journald_layer()?.with_filter(filter).boxed(),
    };
    Ok(layer)
}

pub(crate) fn env_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

// Falls back to UTC when the local offset cannot be determined safely.
fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_layer() -> Result<tracing_journald::Layer, LoggerError> {
    tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald socket: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_layer() -> Result<fmt::Layer<Registry>, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directive_lists() {
        assert!(env_filter("info").is_ok());
        assert!(env_filter("warn,leasehold_runner=debug").is_ok());
    }

    #[test]
    fn rejects_bad_level_directive() {
        let err = env_filter("leasehold_runner=loud").unwrap_err();
        assert!(
            matches!(err, LoggerError::InvalidLogLevel(ref s) if s == "leasehold_runner=loud")
        );
    }

    #[test]
    fn builds_text_and_json_layers() {
        let text = LoggerConfig::default().with_color(false);
        assert!(output_layer(&text).is_ok());

        let json = LoggerConfig::default().with_format(LoggerFormat::Json);
        assert!(output_layer(&json).is_ok());
    }

    #[cfg(not(all(target_os = "linux", feature = "journald")))]
    #[test]
    fn journald_layer_unavailable_without_feature() {
        let cfg = LoggerConfig::default().with_format(LoggerFormat::Journald);
        assert!(matches!(
            output_layer(&cfg),
            Err(LoggerError::JournaldNotSupported)
        ));
    }
}
