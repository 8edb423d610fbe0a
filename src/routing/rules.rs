//! Rule File Loading and Auto-Rule Persistence
//!
//! The static rule file is plain text, one `<matchkey>,<type>` rule per
//! line; blank lines and `#` comments are ignored. Malformed lines are
//! logged and skipped, never fatal. Auto-learned rules are persisted
//! separately as a YAML map of `host: {type, port}`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use ipnet::IpNet;
use tracing::{debug, info, warn};

use super::store::RuleStore;
use super::types::{HostRule, ProxyDecision};
use crate::Result;

/// Match key of a parsed rule line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKey {
    /// Exact hostname or literal IP
    Host(String),
    /// CIDR network
    Cidr(IpNet),
}

/// Parse one rule-file line.
///
/// Returns `None` for blank lines and comments, `Err` for malformed
/// lines (wrong token count, bad CIDR, unknown type keyword).
pub fn parse_line(line: &str) -> Option<Result<(RuleKey, ProxyDecision)>> {
    let line = line.trim_matches(|c| c == ' ' || c == '\t');
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split(',');
    let (key, ty) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(key), Some(ty), None) => (key, ty),
        _ => return Some(Err(anyhow::anyhow!("invalid rule: {}", line))),
    };

    let decision = match ty.parse::<ProxyDecision>() {
        Ok(decision) => decision,
        Err(e) => return Some(Err(anyhow::Error::new(e))),
    };

    // A '/' marks a CIDR match key; anything else is an exact host.
    if key.contains('/') {
        match key.parse::<IpNet>() {
            Ok(net) => Some(Ok((RuleKey::Cidr(net), decision))),
            Err(_) => Some(Err(anyhow::anyhow!("bad cidr: {}", key))),
        }
    } else {
        Some(Ok((RuleKey::Host(key.to_string()), decision)))
    }
}

/// Load user rules from the static rule file into the store.
///
/// A missing file is tolerated: the store simply starts without user
/// rules. Bad lines are logged and skipped.
pub async fn load_rules(store: &RuleStore, path: &Path) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            warn!("rule file not found: {}", path.display());
            return;
        }
    };

    let mut loaded = 0usize;
    for line in content.lines() {
        match parse_line(line) {
            None => {}
            Some(Ok((RuleKey::Host(host), decision))) => {
                store.insert_host(&host, HostRule::new(decision)).await;
                loaded += 1;
            }
            Some(Ok((RuleKey::Cidr(net), decision))) => {
                store.insert_cidr(net, decision).await;
                loaded += 1;
            }
            Some(Err(e)) => warn!("{}", e),
        }
    }
    info!("loaded {} rules from {}", loaded, path.display());
}

/// Save the auto-generated subset of the store to disk.
pub async fn save_auto(store: &RuleStore, path: &Path) -> Result<()> {
    let rules = store.export_auto().await;
    let yaml = serde_yaml::to_string(&rules)
        .with_context(|| "failed to serialize auto rules")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("failed to write auto rules: {}", path.display()))?;
    debug!("saved {} auto rules to {}", rules.len(), path.display());
    Ok(())
}

/// Load previously saved auto rules and merge them into the store.
///
/// A missing or unparseable file is tolerated: there is simply nothing
/// to load. User rules already in the store are never overwritten.
pub async fn load_auto(store: &RuleStore, path: &Path) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            debug!("no auto rules to load from {}", path.display());
            return;
        }
    };

    let rules: HashMap<String, HostRule> = match serde_yaml::from_str(&content) {
        Ok(rules) => rules,
        Err(e) => {
            warn!("ignoring malformed auto rules {}: {}", path.display(), e);
            return;
        }
    };

    let count = rules.len();
    store.import_auto(rules).await;
    info!("loaded {} auto rules from {}", count, path.display());
}
