//! Routing Types

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Routing decision for a destination host
///
/// `Direct`, `Proxy` and `Reject` come from the user's rule file and are
/// permanent for the process lifetime. `AutoDirect` and `AutoProxy` are
/// written by the connectivity probe and may be overwritten by later probes.
/// "No rule yet" is represented as a lookup miss, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyDecision {
    /// Connect to the destination directly
    Direct,
    /// Connect through the upstream proxy
    Proxy,
    /// Refuse the connection
    Reject,
    /// Direct, learned from a successful connectivity probe
    AutoDirect,
    /// Proxy, learned from a failed connectivity probe
    AutoProxy,
}

impl ProxyDecision {
    /// Returns true if this decision was produced by the probe rather
    /// than the static rule file.
    pub fn is_auto(&self) -> bool {
        matches!(self, ProxyDecision::AutoDirect | ProxyDecision::AutoProxy)
    }
}

impl fmt::Display for ProxyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProxyDecision::Direct => "direct",
            ProxyDecision::Proxy => "proxy",
            ProxyDecision::Reject => "reject",
            ProxyDecision::AutoDirect => "auto-direct",
            ProxyDecision::AutoProxy => "auto-proxy",
        };
        f.write_str(s)
    }
}

impl FromStr for ProxyDecision {
    type Err = UnknownDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The keyword set is case-sensitive.
        match s {
            "direct" => Ok(ProxyDecision::Direct),
            "proxy" => Ok(ProxyDecision::Proxy),
            "reject" => Ok(ProxyDecision::Reject),
            "auto-direct" => Ok(ProxyDecision::AutoDirect),
            "auto-proxy" => Ok(ProxyDecision::AutoProxy),
            other => Err(UnknownDecision(other.to_string())),
        }
    }
}

/// Error for an unrecognized decision keyword in a rule line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDecision(pub String);

impl fmt::Display for UnknownDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown proxy decision: {}", self.0)
    }
}

impl std::error::Error for UnknownDecision {}

/// Stored rule value for an exact-host entry
///
/// `port` records the destination port of the first learning observation.
/// It is informational and only used when the recheck loop re-probes the
/// host; matching never keys on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostRule {
    #[serde(rename = "type")]
    pub decision: ProxyDecision,
    #[serde(default)]
    pub port: u16,
}

impl HostRule {
    pub fn new(decision: ProxyDecision) -> Self {
        Self { decision, port: 0 }
    }

    pub fn with_port(decision: ProxyDecision, port: u16) -> Self {
        Self { decision, port }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_keyword_round_trip() {
        for s in ["direct", "proxy", "reject", "auto-direct", "auto-proxy"] {
            let d: ProxyDecision = s.parse().unwrap();
            assert_eq!(d.to_string(), s);
        }
    }

    #[test]
    fn test_decision_keywords_are_case_sensitive() {
        assert!("Direct".parse::<ProxyDecision>().is_err());
        assert!("AUTO-PROXY".parse::<ProxyDecision>().is_err());
        assert!("".parse::<ProxyDecision>().is_err());
    }

    #[test]
    fn test_is_auto() {
        assert!(ProxyDecision::AutoDirect.is_auto());
        assert!(ProxyDecision::AutoProxy.is_auto());
        assert!(!ProxyDecision::Direct.is_auto());
        assert!(!ProxyDecision::Proxy.is_auto());
        assert!(!ProxyDecision::Reject.is_auto());
    }
}
