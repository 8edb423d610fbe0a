//! Rule Store
//!
//! Holds exact-host rules and CIDR-range rules behind a single
//! reader-writer lock. Reads share the lock, writes are exclusive, and a
//! rule mutation is atomic with respect to both mappings, so a concurrent
//! reader never observes a half-applied change.

use std::collections::HashMap;
use std::net::IpAddr;
use ipnet::IpNet;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{HostRule, ProxyDecision};

#[derive(Debug, Default)]
struct RuleSet {
    hosts: HashMap<String, HostRule>,
    cidrs: Vec<(IpNet, ProxyDecision)>,
}

/// Concurrent store of routing rules
///
/// Populated once at startup from the rule file, then mutated by the
/// learning path for the process lifetime. User-authored entries are
/// immutable after load; only auto entries are ever replaced.
#[derive(Debug, Default)]
pub struct RuleStore {
    inner: RwLock<RuleSet>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-host lookup. Callers lower-case the host before any lookup.
    pub async fn lookup(&self, host: &str) -> Option<HostRule> {
        self.inner.read().await.hosts.get(host).copied()
    }

    /// Linear scan over CIDR rules; the first containing network wins.
    ///
    /// Overlapping networks have no defined priority, the result follows
    /// load order. The rule file should avoid overlapping CIDRs.
    pub async fn lookup_cidr(&self, ip: IpAddr) -> Option<ProxyDecision> {
        let set = self.inner.read().await;
        set.cidrs
            .iter()
            .find(|(net, _)| net.contains(&ip))
            .map(|(_, decision)| *decision)
    }

    /// Insert a rule from the static rule file (load path, no overwrite
    /// protection: the file is the authority at startup).
    pub async fn insert_host(&self, host: &str, rule: HostRule) {
        let mut set = self.inner.write().await;
        set.hosts.insert(host.to_lowercase(), rule);
    }

    /// Insert a CIDR rule from the static rule file.
    pub async fn insert_cidr(&self, net: IpNet, decision: ProxyDecision) {
        let mut set = self.inner.write().await;
        set.cidrs.push((net, decision));
    }

    /// Record a probe-learned decision for a host.
    ///
    /// Never overwrites a user rule: if the existing rule is
    /// Direct/Proxy/Reject this is a logged no-op. An existing auto rule
    /// with a different decision is replaced, which is how the recheck
    /// loop promotes auto-proxy hosts to auto-direct.
    pub async fn learn(&self, host: &str, port: u16, decision: ProxyDecision) {
        let host = host.to_lowercase();
        let mut set = self.inner.write().await;
        match set.hosts.get(&host).copied() {
            Some(existing) if !existing.decision.is_auto() => {
                info!(
                    "keeping user rule [{}] for {}, ignoring learned [{}]",
                    existing.decision, host, decision
                );
            }
            Some(existing) => {
                set.hosts.insert(host.clone(), HostRule::with_port(decision, port));
                if existing.decision != decision {
                    info!("* change rule [{} -> {}] {}", existing.decision, decision, host);
                }
            }
            None => {
                set.hosts.insert(host.clone(), HostRule::with_port(decision, port));
                info!("+ add rule [{}] {}", decision, host);
            }
        }
    }

    /// Remove any rule for a host (manual invalidation).
    pub async fn delete(&self, host: &str) {
        let host = host.to_lowercase();
        let mut set = self.inner.write().await;
        if set.hosts.remove(&host).is_some() {
            info!("- delete rule {}", host);
        }
    }

    /// Snapshot of exactly the auto-generated entries.
    pub async fn export_auto(&self) -> HashMap<String, HostRule> {
        let set = self.inner.read().await;
        set.hosts
            .iter()
            .filter(|(_, rule)| rule.decision.is_auto())
            .map(|(host, rule)| (host.clone(), *rule))
            .collect()
    }

    /// Merge previously exported auto entries back into the store.
    ///
    /// Entries never clobber user rules; existing auto rules are
    /// overwritten, supporting reload-then-refresh semantics.
    pub async fn import_auto(&self, rules: HashMap<String, HostRule>) {
        let mut set = self.inner.write().await;
        for (host, rule) in rules {
            let host = host.to_lowercase();
            if let Some(existing) = set.hosts.get(&host) {
                if !existing.decision.is_auto() {
                    debug!("skipping imported auto rule for {}, user rule present", host);
                    continue;
                }
            }
            set.hosts.insert(host, rule);
        }
    }

    /// Snapshot the hosts currently classified auto-proxy, for the
    /// recheck loop. Taken under the read lock and released before any
    /// probing happens.
    pub async fn auto_proxy_hosts(&self) -> Vec<(String, u16)> {
        let set = self.inner.read().await;
        set.hosts
            .iter()
            .filter(|(_, rule)| rule.decision == ProxyDecision::AutoProxy)
            .map(|(host, rule)| (host.clone(), rule.port))
            .collect()
    }

    /// Total number of exact-host rules (for diagnostics).
    pub async fn host_rule_count(&self) -> usize {
        self.inner.read().await.hosts.len()
    }

    /// Total number of CIDR rules (for diagnostics).
    pub async fn cidr_rule_count(&self) -> usize {
        self.inner.read().await.cidrs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_learn_does_not_overwrite_user_rule() {
        let store = RuleStore::new();
        store.insert_host("example.com", HostRule::new(ProxyDecision::Proxy)).await;

        store.learn("example.com", 80, ProxyDecision::AutoDirect).await;

        let rule = store.lookup("example.com").await.unwrap();
        assert_eq!(rule.decision, ProxyDecision::Proxy);
    }

    #[tokio::test]
    async fn test_learn_overwrites_auto_rule() {
        let store = RuleStore::new();
        store.learn("example.com", 443, ProxyDecision::AutoProxy).await;
        store.learn("example.com", 443, ProxyDecision::AutoDirect).await;

        let rule = store.lookup("example.com").await.unwrap();
        assert_eq!(rule.decision, ProxyDecision::AutoDirect);
        assert_eq!(rule.port, 443);
    }

    #[tokio::test]
    async fn test_learn_lowercases_host() {
        let store = RuleStore::new();
        store.learn("Example.COM", 80, ProxyDecision::AutoDirect).await;
        assert!(store.lookup("example.com").await.is_some());
    }

    #[tokio::test]
    async fn test_cidr_containment() {
        let store = RuleStore::new();
        let net: IpNet = "10.0.0.0/8".parse().unwrap();
        store.insert_cidr(net, ProxyDecision::Reject).await;

        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(store.lookup_cidr(ip).await, Some(ProxyDecision::Reject));

        let outside: IpAddr = "11.1.2.3".parse().unwrap();
        assert_eq!(store.lookup_cidr(outside).await, None);
    }

    #[tokio::test]
    async fn test_delete_removes_rule() {
        let store = RuleStore::new();
        store.learn("example.com", 80, ProxyDecision::AutoProxy).await;
        store.delete("example.com").await;
        assert!(store.lookup("example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_export_auto_excludes_user_rules() {
        let store = RuleStore::new();
        store.insert_host("user.example", HostRule::new(ProxyDecision::Direct)).await;
        store.learn("auto.example", 80, ProxyDecision::AutoProxy).await;

        let exported = store.export_auto().await;
        assert_eq!(exported.len(), 1);
        assert_eq!(
            exported.get("auto.example").unwrap().decision,
            ProxyDecision::AutoProxy
        );
    }

    #[tokio::test]
    async fn test_import_auto_respects_user_rules() {
        let store = RuleStore::new();
        store.insert_host("user.example", HostRule::new(ProxyDecision::Reject)).await;

        let mut rules = HashMap::new();
        rules.insert(
            "user.example".to_string(),
            HostRule::with_port(ProxyDecision::AutoDirect, 80),
        );
        rules.insert(
            "learned.example".to_string(),
            HostRule::with_port(ProxyDecision::AutoProxy, 443),
        );
        store.import_auto(rules).await;

        assert_eq!(
            store.lookup("user.example").await.unwrap().decision,
            ProxyDecision::Reject
        );
        assert_eq!(
            store.lookup("learned.example").await.unwrap().decision,
            ProxyDecision::AutoProxy
        );
    }

    #[tokio::test]
    async fn test_auto_proxy_snapshot() {
        let store = RuleStore::new();
        store.learn("a.example", 80, ProxyDecision::AutoProxy).await;
        store.learn("b.example", 443, ProxyDecision::AutoDirect).await;
        store.insert_host("c.example", HostRule::new(ProxyDecision::Proxy)).await;

        let hosts = store.auto_proxy_hosts().await;
        assert_eq!(hosts, vec![("a.example".to_string(), 80)]);
    }
}
