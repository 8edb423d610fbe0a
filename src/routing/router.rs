//! Connection Router
//!
//! Decides how to reach a destination host:port: directly, through the
//! proxy, or not at all. Rule hits are answered from the store; misses
//! fall through to the connectivity probe and the learned decision is
//! recorded for subsequent lookups.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::debug;

use super::probe::Prober;
use super::store::RuleStore;
use super::types::ProxyDecision;

/// Makes routing decisions for outbound connection requests
pub struct Router {
    store: Arc<RuleStore>,
    prober: Arc<dyn Prober>,
}

impl Router {
    pub fn new(store: Arc<RuleStore>, prober: Arc<dyn Prober>) -> Self {
        Self { store, prober }
    }

    /// Decide how to reach `host:port`.
    ///
    /// Fast path: an exact, CIDR, or non-auto suffix rule hit. Slow path:
    /// a deduplicated connectivity probe whose outcome is learned into the
    /// store, so the caller may block for up to the probe timeout the
    /// first time an unknown host is seen.
    pub async fn decide(&self, host: &str, port: u16) -> ProxyDecision {
        let host = host.to_lowercase();

        // Bare top-level names (localhost, machines on the local network)
        // are always direct: never probed, never persisted.
        if !host.contains('.') {
            return ProxyDecision::Direct;
        }

        if let Some(decision) = self.match_rules(&host).await {
            return decision;
        }

        debug!("? checking {} ...", host);
        let decision = if self.prober.check(&host, port).await {
            ProxyDecision::AutoDirect
        } else {
            ProxyDecision::AutoProxy
        };
        self.store.learn(&host, port, decision).await;
        decision
    }

    async fn match_rules(&self, host: &str) -> Option<ProxyDecision> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            if let Some(rule) = self.store.lookup(host).await {
                return Some(rule.decision);
            }
            return self.store.lookup_cidr(IpAddr::V4(ip)).await;
        }

        if let Some(rule) = self.store.lookup(host).await {
            return Some(rule.decision);
        }

        // Suffix walk, most specific first:
        //   play.golang.org -> golang.org -> org
        // Auto rules record a guess about one specific host and are never
        // trusted for siblings or subdomains, so they only match exactly.
        let mut part = host;
        while let Some(index) = part.find('.') {
            part = &part[index + 1..];
            if let Some(rule) = self.store.lookup(part).await {
                if !rule.decision.is_auto() {
                    return Some(rule.decision);
                }
            }
        }

        None
    }
}
