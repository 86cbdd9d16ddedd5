use anyhow::Context;
use leasehold_observe::{LoggerConfig, LoggerFormat};
use leasehold_runner::{MemorySize, RunnerConfig};

/// Everything `agentd` reads from its environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logger: LoggerConfig,
    pub runner: RunnerConfig,
    /// Run interval handed to the digest task, in seconds.
    pub interval: i64,
    pub redis_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let mut logger = LoggerConfig::default();
        if let Some(level) = var("LEASEHOLD_LOG_LEVEL") {
            logger = logger.with_level(level);
        }
        if let Some(format) = var("LEASEHOLD_LOG_FORMAT") {
            logger = logger.with_format(format.parse::<LoggerFormat>()?);
        }

        let mut runner = RunnerConfig::new();
        if let Some(raw) = var("LEASEHOLD_RUN_LIMIT") {
            let runs = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("LEASEHOLD_RUN_LIMIT={raw}"))?;
            runner = runner.with_run_limit(runs);
        }
        if let Some(raw) = var("LEASEHOLD_MEMORY_LIMIT") {
            let MemorySize(bytes) = raw.parse::<MemorySize>()?;
            runner = runner.with_memory_limit(bytes);
        }
        if let Some(raw) = var("LEASEHOLD_EXCEPTION_SLEEP") {
            runner = runner.with_exception_sleep(parse_flag(&raw)?);
        }

        let interval = match var("LEASEHOLD_INTERVAL") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("LEASEHOLD_INTERVAL={raw}"))?,
            None => 60,
        };

        Ok(Self {
            logger,
            runner,
            interval,
            redis_url: var("LEASEHOLD_REDIS_URL"),
        })
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean flag, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.interval, 60);
        assert_eq!(s.runner.run_limit, None);
        assert_eq!(s.runner.memory_limit_bytes, None);
        assert!(s.runner.exception_sleep);
        assert!(s.redis_url.is_none());
        assert_eq!(s.logger.format, LoggerFormat::Text);
    }

    #[test]
    fn reads_every_variable() {
        let s = settings(&[
            ("LEASEHOLD_LOG_LEVEL", "debug"),
            ("LEASEHOLD_LOG_FORMAT", "json"),
            ("LEASEHOLD_RUN_LIMIT", "500"),
            ("LEASEHOLD_MEMORY_LIMIT", "256M"),
            ("LEASEHOLD_EXCEPTION_SLEEP", "off"),
            ("LEASEHOLD_INTERVAL", "15"),
            ("LEASEHOLD_REDIS_URL", "redis://127.0.0.1/"),
        ])
        .unwrap();

        assert_eq!(s.logger.level, "debug");
        assert_eq!(s.logger.format, LoggerFormat::Json);
        assert_eq!(s.runner.run_limit, Some(500));
        assert_eq!(s.runner.memory_limit_bytes, Some(256 * 1024 * 1024));
        assert!(!s.runner.exception_sleep);
        assert_eq!(s.interval, 15);
        assert_eq!(s.redis_url.as_deref(), Some("redis://127.0.0.1/"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let s = settings(&[("LEASEHOLD_RUN_LIMIT", "  "), ("LEASEHOLD_REDIS_URL", "")]).unwrap();
        assert_eq!(s.runner.run_limit, None);
        assert!(s.redis_url.is_none());
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(settings(&[("LEASEHOLD_RUN_LIMIT", "many")]).is_err());
        assert!(settings(&[("LEASEHOLD_MEMORY_LIMIT", "lots")]).is_err());
        assert!(settings(&[("LEASEHOLD_EXCEPTION_SLEEP", "maybe")]).is_err());
        assert!(settings(&[("LEASEHOLD_LOG_FORMAT", "yaml")]).is_err());
    }
}
