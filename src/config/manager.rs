//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, falling back to defaults if the
    /// file does not exist.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?;

            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!(
                "configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load defaults with environment variable overrides.
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(rule_file) = std::env::var("RUSTROUTE_RULE_FILE") {
            config.rules.rule_file = rule_file.into();
        }

        if let Ok(auto_file) = std::env::var("RUSTROUTE_AUTO_RULE_FILE") {
            config.rules.auto_rule_file = auto_file.into();
        }

        if let Ok(timeout) = std::env::var("RUSTROUTE_PROBE_TIMEOUT") {
            config.probe.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("invalid RUSTROUTE_PROBE_TIMEOUT: {}", timeout))?;
        }

        if let Ok(interval) = std::env::var("RUSTROUTE_RECHECK_INTERVAL") {
            config.recheck.interval = humantime::parse_duration(&interval)
                .with_context(|| format!("invalid RUSTROUTE_RECHECK_INTERVAL: {}", interval))?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.probe.connect_timeout.is_zero() {
            bail!("probe.connect_timeout must be greater than zero");
        }
        if self.recheck.enabled && self.recheck.interval.is_zero() {
            bail!("recheck.interval must be greater than zero when recheck is enabled");
        }
        Ok(())
    }
}
