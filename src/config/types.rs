//! Configuration Types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub rules: RulesConfig,
    pub probe: ProbeConfig,
    pub recheck: RecheckConfig,
}

/// Rule file locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Static rule file with user-authored rules
    pub rule_file: PathBuf,
    /// File where auto-learned rules are persisted between runs
    pub auto_rule_file: PathBuf,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rule_file: PathBuf::from("rules.txt"),
            auto_rule_file: PathBuf::from("rules.auto.yaml"),
        }
    }
}

/// Connectivity probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Timeout for the TCP connect and for the TLS handshake
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Destinations on this port get a TLS handshake after the connect
    pub tls_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            tls_port: 443,
        }
    }
}

/// Recheck loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecheckConfig {
    pub enabled: bool,
    /// Delay before the first pass, letting the client reach steady state
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Interval between passes
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RecheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(10),
            interval: Duration::from_secs(12 * 60 * 60),
        }
    }
}
