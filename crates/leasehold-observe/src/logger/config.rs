use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

/// How the process-wide subscriber should be built.
///
/// `level` takes any `EnvFilter` directive string, e.g. `info` or `warn,leasehold_runner=debug`.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    pub fn with_format(mut self, format: LoggerFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_targets(mut self, on: bool) -> Self {
        self.with_targets = on;
        self
    }

    pub fn with_color(mut self, on: bool) -> Self {
        self.use_color = on;
        self
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_text_at_info() {
        let cfg = LoggerConfig::default();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.level, "info");
        assert!(cfg.with_targets);
    }

    #[test]
    fn builders_override_fields() {
        let cfg = LoggerConfig::default()
            .with_format(LoggerFormat::Json)
            .with_level("warn,leasehold_runner=debug")
            .with_targets(false)
            .with_color(false);

        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "warn,leasehold_runner=debug");
        assert!(!cfg.with_targets);
        assert!(!cfg.use_color);
    }
}
